// Library interface for server - exposes modules for testing

pub mod barrier;
pub mod config;
pub mod listener;
pub mod session;
pub mod store;
