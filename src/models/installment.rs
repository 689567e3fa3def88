//! Installment model - one scheduled payment within a plan.

use crate::error::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Date format accepted on the generic status-update path.
pub const PAID_DATE_FORMAT: &str = "%Y-%m-%d";

/// Installment status. The wire strings are fixed by the consuming layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallmentStatus {
    Pendente,
    Pago,
}

impl InstallmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallmentStatus::Pendente => "Pendente",
            InstallmentStatus::Pago => "Pago",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "Pago" => InstallmentStatus::Pago,
            _ => InstallmentStatus::Pendente,
        }
    }
}

impl std::fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One scheduled payment. `row_version` is the optimistic-concurrency token;
/// every mutation checks it and bumps it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Installment {
    pub installment_id: Uuid,
    pub plan_id: Uuid,
    pub installment_number: i32,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub status: String,
    pub paid_date: Option<NaiveDate>,
    pub row_version: i64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Installment {
    /// Get parsed status.
    pub fn parsed_status(&self) -> InstallmentStatus {
        InstallmentStatus::from_string(&self.status)
    }

    /// Due date in the day/month/year form the consuming layer renders.
    pub fn due_date_br(&self) -> String {
        self.due_date.format("%d/%m/%Y").to_string()
    }

    /// Paid date in the hyphenated year-month-day form, if paid.
    pub fn paid_date_iso(&self) -> Option<String> {
        self.paid_date
            .map(|d| d.format(PAID_DATE_FORMAT).to_string())
    }
}

/// Parse a paid-date string from the generic status-update path. Accepts
/// exactly the hyphenated year-month-day form.
pub fn parse_paid_date(input: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(input, PAID_DATE_FORMAT).map_err(|e| {
        AppError::ValidationError(anyhow::anyhow!("Invalid paid date '{}': {}", input, e))
    })
}

/// Filter parameters for listing installments.
#[derive(Debug, Clone, Default)]
pub struct ListInstallmentsFilter {
    pub status: Option<InstallmentStatus>,
    pub receivable_id: Option<Uuid>,
}
