pub mod archive;
pub mod runner;
pub mod step;

pub use runner::{InstallOutcome, Installer};
pub use step::{InstallScript, InstallationStep, Segment};
