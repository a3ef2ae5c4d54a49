pub mod backtester;
pub mod commands;
pub mod config;
pub mod data_context;
pub mod error;
pub mod indicators;
pub mod market;
pub mod models;
pub mod optimizer;
pub mod param_utils;
pub mod performance;
pub mod price_history;
pub mod strategy;
