pub mod install;
pub mod resolver;

pub use install::{ModInstallReport, ModInstaller};
pub use resolver::{ModInfo, ModRecord};
