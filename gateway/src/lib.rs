pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod types;
pub mod upstream;

pub use config::GatewayConfig;
pub use error::{FetchFailure, GatewayError};
pub use services::Gateway;
