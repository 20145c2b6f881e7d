//! HTTP request handlers for the gateway.

pub mod data;
pub mod health;

pub use data::get_data;
pub use health::health_check;
