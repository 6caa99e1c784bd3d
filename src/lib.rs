pub mod api;
pub mod clients;
pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod usecases;
pub mod utils;
