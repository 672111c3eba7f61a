pub mod analyzer;
pub mod config;
pub mod error;
pub mod inventory;
pub mod serde_paths;
