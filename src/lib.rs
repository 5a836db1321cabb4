//! Alerting core for delivery operations: late-visit and message monitors
//! that poll the backing store, plus the alert view the dashboard reads.

pub mod aggregator;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod processor;

pub use aggregator::{AlertAggregator, AlertStats};
pub use error::{Error, Result};
