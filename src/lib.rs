pub mod config;
pub mod error;
pub mod github;
pub mod model;
pub mod notify;
pub mod poll;
pub mod server;
pub mod store;
