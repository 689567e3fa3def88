//! Domain models for the receivables engine.

mod installment;
mod plan;
mod receivable;

pub use installment::{
    parse_paid_date, Installment, InstallmentStatus, ListInstallmentsFilter, PAID_DATE_FORMAT,
};
pub use plan::{CreatePlan, InstallmentPlan, PaymentType, PlanWithInstallments};
pub use receivable::{CreateReceivable, ListReceivablesFilter, Receivable, UpdateReceivable};
