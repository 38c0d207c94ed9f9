pub mod config;
pub mod error;
pub mod monitor;
pub mod queue;
pub mod redis_pool;
pub mod session;
pub mod types;
