pub mod app_error;
pub mod config;
pub mod counters;
pub mod db;
pub mod firehose;
pub mod identity;
pub mod models;
pub mod projectors;
pub mod reads;
pub mod web;

pub use crate::config::AppConfig;
