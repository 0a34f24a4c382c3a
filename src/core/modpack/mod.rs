pub mod installer;
pub mod manifest;

pub use installer::{ModpackInstaller, ModpackOutcome, ModpackPhase};
pub use manifest::ModpackManifest;
