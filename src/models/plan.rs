//! Installment plan model.

use crate::error::AppError;
use crate::models::Installment;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment type of a plan. Determines the due-date rule of the generated
/// schedule; unknown strings map to `Outros`, which follows the monthly rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    Entrada,
    Mensal,
    Anual,
    Investimento,
    Financiamento,
    Outros,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Entrada => "Entrada",
            PaymentType::Mensal => "Mensal",
            PaymentType::Anual => "Anual",
            PaymentType::Investimento => "Investimento",
            PaymentType::Financiamento => "Financiamento",
            PaymentType::Outros => "Outros",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "Entrada" => PaymentType::Entrada,
            "Mensal" => PaymentType::Mensal,
            "Anual" => PaymentType::Anual,
            "Investimento" => PaymentType::Investimento,
            "Financiamento" => PaymentType::Financiamento,
            _ => PaymentType::Outros,
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Installment plan header. Count and total are immutable once the
/// installments are generated; regeneration is delete + recreate.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InstallmentPlan {
    pub plan_id: Uuid,
    pub receivable_id: Uuid,
    pub payment_type: String,
    pub installment_count: i32,
    pub total_amount: Decimal,
    pub created_utc: DateTime<Utc>,
}

impl InstallmentPlan {
    /// Get parsed payment type.
    pub fn parsed_payment_type(&self) -> PaymentType {
        PaymentType::from_string(&self.payment_type)
    }
}

/// Input for creating a plan.
#[derive(Debug, Clone)]
pub struct CreatePlan {
    pub receivable_id: Uuid,
    pub payment_type: PaymentType,
    pub installment_count: i32,
    pub total_amount: Decimal,
}

impl CreatePlan {
    /// Check the generation preconditions. Runs before anything is persisted.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.installment_count < 1 {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "Installment count must be at least 1, got {}",
                self.installment_count
            )));
        }
        if self.total_amount <= Decimal::ZERO {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "Total amount must be positive, got {}",
                self.total_amount
            )));
        }
        Ok(())
    }
}

/// Plan header with its installments nested in sequence order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanWithInstallments {
    pub plan: InstallmentPlan,
    pub installments: Vec<Installment>,
}
