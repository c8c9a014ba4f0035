pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod prompts;
pub mod provider;
pub mod server;
