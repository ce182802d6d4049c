pub mod schema;
pub mod service;

pub use service::*;
