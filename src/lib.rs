pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod live;
pub mod middleware;
pub mod router;
pub mod service;

pub use error::HubError;
