pub mod migrate;
pub mod model;
pub mod store;

pub use migrate::LATEST_CONFIG_VERSION;
pub use model::Config;
