pub mod config;
pub mod error;
pub mod observability;
pub mod segment;
pub mod state;
pub mod stream;
