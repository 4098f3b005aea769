pub mod error;
pub mod sim_conf;
pub mod scenario;
pub mod layers;

pub use error::ConfigError;
