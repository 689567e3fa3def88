//! Receivables Engine - installment-plan generation and settlement tracking.

pub mod config;
pub mod error;
pub mod models;
pub mod observability;
pub mod schedule;
pub mod services;
