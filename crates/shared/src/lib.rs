pub mod auth;
pub mod config;
pub mod telemetry;

pub use auth::*;
pub use config::*;
pub use telemetry::*;
