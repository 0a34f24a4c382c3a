pub mod identity;

pub use identity::{resolve, JarIdentity};
