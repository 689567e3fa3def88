//! Services module for the receivables engine.

pub mod database;
pub mod metrics;

pub use database::Database;
pub use metrics::{
    get_metrics, init_metrics, record_error, record_plan_operation, record_receivable_operation,
    record_settlement_operation,
};
