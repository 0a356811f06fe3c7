pub mod auth;
pub mod catalog;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod global;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod retry;
pub mod transfer;
pub mod zoom;
