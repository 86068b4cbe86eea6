pub mod backup;
pub mod compression;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod log;
pub mod storage;
pub mod upload;
