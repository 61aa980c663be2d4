pub mod config;
pub mod logging;

// Core modules
pub mod blacklist;
pub mod engine;
pub mod queue;
pub mod request;
pub mod store;
pub mod transport;
