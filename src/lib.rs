pub mod artifact;
pub mod config;
pub mod error;
pub mod publish;
pub mod records;
pub mod retry;
pub mod ring;
pub mod types;
