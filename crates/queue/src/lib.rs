//! Redis-backed queue service with visibility timeouts and receive counts.

pub mod redis_queue;

pub use redis_queue::RedisQueue;
