//! Protocol waiters for the built-in schemes.

pub mod http;
pub mod redis;
pub mod sql;
