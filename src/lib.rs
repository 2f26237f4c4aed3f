pub mod accounts;
pub mod aws;
pub mod broker;
pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod export;
pub mod prompt;
pub mod resolver;
pub mod session;
