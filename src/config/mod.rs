pub mod settings;
pub mod store;

pub use settings::{Config, ConfigError, UserId};
pub use store::ConfigStore;
