pub mod store;

pub use store::Cache;
