pub mod runtime;

pub use runtime::{InstalledRuntime, JavaManager};
