pub mod cli;
pub mod commands;
pub mod config;
pub mod consistency;
pub mod embeddings;
pub mod generation;
pub mod indexing;
pub mod library;
pub mod live;
pub mod logging;
pub mod metrics;
pub mod natural;
pub mod search;
pub mod storage;
pub mod tasks;
pub mod web;

pub use config::Config;
pub use tasks::{TaskQueue, TaskStore};
