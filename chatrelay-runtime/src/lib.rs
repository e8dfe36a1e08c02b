pub mod cache;
pub mod config_store;
pub mod files;
pub mod fsutil;
pub mod init;
pub mod runtime_engine;
pub mod transport;
