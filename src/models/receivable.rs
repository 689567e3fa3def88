//! Receivable model - expected income from a project/unit sale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Receivable record. One per sale; at most one per (project, unit) pair
/// when the unit is set.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Receivable {
    pub receivable_id: Uuid,
    pub project_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub description: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a receivable.
#[derive(Debug, Clone)]
pub struct CreateReceivable {
    pub project_id: Uuid,
    pub unit_id: Option<Uuid>,
    pub description: Option<String>,
}

/// Input for updating a receivable. Only descriptive fields are mutable.
#[derive(Debug, Clone, Default)]
pub struct UpdateReceivable {
    pub description: Option<String>,
}

/// Filter parameters for listing receivables.
#[derive(Debug, Clone, Default)]
pub struct ListReceivablesFilter {
    pub project_id: Option<Uuid>,
    pub unit_id: Option<Uuid>,
}
