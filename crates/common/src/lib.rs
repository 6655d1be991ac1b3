pub mod access;
pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod types;
