pub mod consumer;
pub mod database;
pub mod error;
pub mod health;
pub mod password;
pub mod publisher;
pub mod rbmq;
