pub mod archive;
pub mod format;
pub mod store;

pub use format::BackupFormat;
pub use store::{default_name, Backup, BackupStore};
