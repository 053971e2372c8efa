pub mod config;
pub mod generator;
pub mod routes;

pub use config::AppConfig;
