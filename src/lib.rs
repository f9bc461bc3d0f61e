pub mod app;
pub mod concatenate;
pub mod config;
pub mod domain;
pub mod error;
pub mod executor;
pub mod fs_util;
pub mod merge;
pub mod metadata;
pub mod output;
pub mod planner;
pub mod statistics;
pub mod store;
pub mod tui;
