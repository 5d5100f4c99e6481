// Library interface for newsmonitor modules
// This allows tests and the helper binaries to import modules

pub mod articles;
pub mod ingestion;
pub mod llm;
pub mod monitor;
pub mod notify;
pub mod scheduler;
pub mod server;
pub mod storage;
