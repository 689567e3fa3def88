//! Database service for the receivables engine.

use crate::error::AppError;
use crate::models::{
    parse_paid_date, CreatePlan, CreateReceivable, Installment, InstallmentPlan,
    InstallmentStatus, ListInstallmentsFilter, ListReceivablesFilter, PlanWithInstallments,
    Receivable, UpdateReceivable,
};
use crate::schedule;
use crate::services::metrics::{
    record_plan_operation, record_receivable_operation, record_settlement_operation,
    DB_QUERY_DURATION,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const RECEIVABLE_COLUMNS: &str =
    "receivable_id, project_id, unit_id, description, created_utc, updated_utc";
const PLAN_COLUMNS: &str =
    "plan_id, receivable_id, payment_type, installment_count, total_amount, created_utc";
const INSTALLMENT_COLUMNS: &str = "installment_id, plan_id, installment_number, amount, due_date, status, paid_date, row_version, created_utc, updated_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "receivables-engine"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Receivable Operations
    // =========================================================================

    /// Create a new receivable. At most one receivable may exist per
    /// (project, unit) pair when the unit is set.
    #[instrument(skip(self, input), fields(project_id = %input.project_id))]
    pub async fn create_receivable(
        &self,
        input: &CreateReceivable,
    ) -> Result<Receivable, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_receivable"])
            .start_timer();

        if let Some(unit_id) = input.unit_id {
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM receivables WHERE project_id = $1 AND unit_id = $2)",
            )
            .bind(input.project_id)
            .bind(unit_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to check uniqueness: {}", e))
            })?;

            if taken {
                return Err(AppError::ValidationError(anyhow::anyhow!(
                    "A receivable already exists for project {} and unit {}",
                    input.project_id,
                    unit_id
                )));
            }
        }

        let receivable_id = Uuid::new_v4();
        let receivable = sqlx::query_as::<_, Receivable>(&format!(
            r#"
            INSERT INTO receivables (receivable_id, project_id, unit_id, description)
            VALUES ($1, $2, $3, $4)
            RETURNING {RECEIVABLE_COLUMNS}
            "#,
        ))
        .bind(receivable_id)
        .bind(input.project_id)
        .bind(input.unit_id)
        .bind(&input.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            // The partial unique index backstops the pre-insert check under races.
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::ValidationError(anyhow::anyhow!(
                    "A receivable already exists for this project and unit"
                ))
            }
            e => AppError::DatabaseError(anyhow::anyhow!("Failed to create receivable: {}", e)),
        })?;

        timer.observe_duration();
        info!(receivable_id = %receivable.receivable_id, "Receivable created");
        record_receivable_operation("create");

        Ok(receivable)
    }

    /// Get a receivable by ID.
    #[instrument(skip(self), fields(receivable_id = %receivable_id))]
    pub async fn get_receivable(
        &self,
        receivable_id: Uuid,
    ) -> Result<Option<Receivable>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_receivable"])
            .start_timer();

        let receivable = sqlx::query_as::<_, Receivable>(&format!(
            "SELECT {RECEIVABLE_COLUMNS} FROM receivables WHERE receivable_id = $1",
        ))
        .bind(receivable_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get receivable: {}", e)))?;

        timer.observe_duration();

        Ok(receivable)
    }

    /// Check whether a receivable exists.
    #[instrument(skip(self), fields(receivable_id = %receivable_id))]
    pub async fn receivable_exists(&self, receivable_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["receivable_exists"])
            .start_timer();

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM receivables WHERE receivable_id = $1)",
        )
        .bind(receivable_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check receivable: {}", e))
        })?;

        timer.observe_duration();

        Ok(exists)
    }

    /// List receivables, optionally filtered by project and unit.
    #[instrument(skip(self, filter))]
    pub async fn list_receivables(
        &self,
        filter: &ListReceivablesFilter,
    ) -> Result<Vec<Receivable>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_receivables"])
            .start_timer();

        let receivables = sqlx::query_as::<_, Receivable>(&format!(
            r#"
            SELECT {RECEIVABLE_COLUMNS}
            FROM receivables
            WHERE ($1::uuid IS NULL OR project_id = $1)
              AND ($2::uuid IS NULL OR unit_id = $2)
            ORDER BY created_utc, receivable_id
            "#,
        ))
        .bind(filter.project_id)
        .bind(filter.unit_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list receivables: {}", e))
        })?;

        timer.observe_duration();

        Ok(receivables)
    }

    /// Update a receivable's descriptive fields.
    #[instrument(skip(self, input), fields(receivable_id = %receivable_id))]
    pub async fn update_receivable(
        &self,
        receivable_id: Uuid,
        input: &UpdateReceivable,
    ) -> Result<Receivable, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_receivable"])
            .start_timer();

        let receivable = sqlx::query_as::<_, Receivable>(&format!(
            r#"
            UPDATE receivables
            SET description = COALESCE($2, description),
                updated_utc = now()
            WHERE receivable_id = $1
            RETURNING {RECEIVABLE_COLUMNS}
            "#,
        ))
        .bind(receivable_id)
        .bind(&input.description)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update receivable: {}", e))
        })?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Receivable {} not found", receivable_id))
        })?;

        timer.observe_duration();
        record_receivable_operation("update");

        Ok(receivable)
    }

    /// Delete a receivable. Cascades to its plans and their installments.
    #[instrument(skip(self), fields(receivable_id = %receivable_id))]
    pub async fn delete_receivable(&self, receivable_id: Uuid) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_receivable"])
            .start_timer();

        let result = sqlx::query("DELETE FROM receivables WHERE receivable_id = $1")
            .bind(receivable_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete receivable: {}", e))
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Receivable {} not found",
                receivable_id
            )));
        }

        timer.observe_duration();
        info!(receivable_id = %receivable_id, "Receivable deleted");
        record_receivable_operation("delete");

        Ok(())
    }

    // =========================================================================
    // Plan Operations
    // =========================================================================

    /// Create a plan: generate the schedule and persist the header plus all
    /// installments as one transaction. New installments start out pending.
    #[instrument(skip(self, input), fields(receivable_id = %input.receivable_id))]
    pub async fn create_plan(&self, input: &CreatePlan) -> Result<PlanWithInstallments, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_plan"])
            .start_timer();

        input.validate()?;

        if !self.receivable_exists(input.receivable_id).await? {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Receivable {} not found",
                input.receivable_id
            )));
        }

        let anchor = Utc::now().date_naive();
        let lines = schedule::generate(
            input.total_amount,
            input.installment_count as u32,
            input.payment_type,
            anchor,
        );

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let plan_id = Uuid::new_v4();
        let plan = sqlx::query_as::<_, InstallmentPlan>(&format!(
            r#"
            INSERT INTO installment_plans (plan_id, receivable_id, payment_type, installment_count, total_amount)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PLAN_COLUMNS}
            "#,
        ))
        .bind(plan_id)
        .bind(input.receivable_id)
        .bind(input.payment_type.as_str())
        .bind(input.installment_count)
        .bind(input.total_amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert plan: {}", e)))?;

        let mut installments = Vec::with_capacity(lines.len());
        for line in &lines {
            let installment = sqlx::query_as::<_, Installment>(&format!(
                r#"
                INSERT INTO installments (installment_id, plan_id, installment_number, amount, due_date, status)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING {INSTALLMENT_COLUMNS}
                "#,
            ))
            .bind(Uuid::new_v4())
            .bind(plan_id)
            .bind(line.number as i32)
            .bind(line.amount)
            .bind(line.due_date)
            .bind(InstallmentStatus::Pendente.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert installment: {}", e))
            })?;
            installments.push(installment);
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(
            plan_id = %plan.plan_id,
            receivable_id = %plan.receivable_id,
            installment_count = installments.len(),
            total_amount = %plan.total_amount,
            "Plan created"
        );
        record_plan_operation("create");

        Ok(PlanWithInstallments { plan, installments })
    }

    /// Get a plan header by ID.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn get_plan(&self, plan_id: Uuid) -> Result<Option<InstallmentPlan>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_plan"])
            .start_timer();

        let plan = sqlx::query_as::<_, InstallmentPlan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM installment_plans WHERE plan_id = $1",
        ))
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get plan: {}", e)))?;

        timer.observe_duration();

        Ok(plan)
    }

    /// Delete a plan and all of its installments in one transaction.
    /// Returns the number of installments removed.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn delete_plan(&self, plan_id: Uuid) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_plan"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let removed = sqlx::query("DELETE FROM installments WHERE plan_id = $1")
            .bind(plan_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete installments: {}", e))
            })?;

        let header = sqlx::query("DELETE FROM installment_plans WHERE plan_id = $1")
            .bind(plan_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete plan: {}", e))
            })?;

        if header.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Plan {} not found",
                plan_id
            )));
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        info!(
            plan_id = %plan_id,
            installments_removed = removed.rows_affected(),
            "Plan deleted"
        );
        record_plan_operation("delete");

        Ok(removed.rows_affected())
    }

    /// List a receivable's plans with their installments nested in sequence
    /// order.
    #[instrument(skip(self), fields(receivable_id = %receivable_id))]
    pub async fn list_plans_for_receivable(
        &self,
        receivable_id: Uuid,
    ) -> Result<Vec<PlanWithInstallments>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_plans_for_receivable"])
            .start_timer();

        let plans = sqlx::query_as::<_, InstallmentPlan>(&format!(
            r#"
            SELECT {PLAN_COLUMNS}
            FROM installment_plans
            WHERE receivable_id = $1
            ORDER BY created_utc, plan_id
            "#,
        ))
        .bind(receivable_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list plans: {}", e)))?;

        let mut result = Vec::with_capacity(plans.len());
        for plan in plans {
            let installments = self.list_installments_for_plan(plan.plan_id).await?;
            result.push(PlanWithInstallments { plan, installments });
        }

        timer.observe_duration();

        Ok(result)
    }

    /// Get a plan's installments in sequence order.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn list_installments_for_plan(
        &self,
        plan_id: Uuid,
    ) -> Result<Vec<Installment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_installments_for_plan"])
            .start_timer();

        let installments = sqlx::query_as::<_, Installment>(&format!(
            r#"
            SELECT {INSTALLMENT_COLUMNS}
            FROM installments
            WHERE plan_id = $1
            ORDER BY installment_number
            "#,
        ))
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list installments: {}", e))
        })?;

        timer.observe_duration();

        Ok(installments)
    }

    // =========================================================================
    // Settlement Operations
    // =========================================================================

    /// Get an installment by ID.
    #[instrument(skip(self), fields(installment_id = %installment_id))]
    pub async fn get_installment(
        &self,
        installment_id: Uuid,
    ) -> Result<Option<Installment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_installment"])
            .start_timer();

        let installment = sqlx::query_as::<_, Installment>(&format!(
            "SELECT {INSTALLMENT_COLUMNS} FROM installments WHERE installment_id = $1",
        ))
        .bind(installment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get installment: {}", e))
        })?;

        timer.observe_duration();

        Ok(installment)
    }

    /// List installments ordered by due date, optionally filtered by status
    /// and owning receivable.
    #[instrument(skip(self, filter))]
    pub async fn list_installments(
        &self,
        filter: &ListInstallmentsFilter,
    ) -> Result<Vec<Installment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_installments"])
            .start_timer();

        let installments = sqlx::query_as::<_, Installment>(
            r#"
            SELECT i.installment_id, i.plan_id, i.installment_number, i.amount, i.due_date,
                   i.status, i.paid_date, i.row_version, i.created_utc, i.updated_utc
            FROM installments i
            JOIN installment_plans p ON p.plan_id = i.plan_id
            WHERE ($1::varchar IS NULL OR i.status = $1)
              AND ($2::uuid IS NULL OR p.receivable_id = $2)
            ORDER BY i.due_date, i.installment_number
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.receivable_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list installments: {}", e))
        })?;

        timer.observe_duration();

        Ok(installments)
    }

    /// Mark an installment paid. A positive `paid_amount` replaces the
    /// scheduled amount (settlement at an adjusted value); zero or absent
    /// keeps the amount already on the row.
    #[instrument(skip(self), fields(installment_id = %installment_id))]
    pub async fn mark_paid(
        &self,
        installment_id: Uuid,
        paid_amount: Option<Decimal>,
        paid_date: NaiveDate,
    ) -> Result<Installment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_paid"])
            .start_timer();

        let current = self.get_installment(installment_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Installment {} not found", installment_id))
        })?;

        let amount = match paid_amount {
            Some(value) if value > Decimal::ZERO => value,
            _ => current.amount,
        };

        let updated = sqlx::query_as::<_, Installment>(&format!(
            r#"
            UPDATE installments
            SET status = $3, amount = $4, paid_date = $5,
                row_version = row_version + 1, updated_utc = now()
            WHERE installment_id = $1 AND row_version = $2
            RETURNING {INSTALLMENT_COLUMNS}
            "#,
        ))
        .bind(installment_id)
        .bind(current.row_version)
        .bind(InstallmentStatus::Pago.as_str())
        .bind(amount)
        .bind(paid_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark installment paid: {}", e))
        })?;

        let installment = match updated {
            Some(installment) => installment,
            None => return Err(self.stale_installment(installment_id).await),
        };

        timer.observe_duration();
        info!(
            installment_id = %installment.installment_id,
            amount = %installment.amount,
            "Installment marked paid"
        );
        record_settlement_operation("mark_paid");

        Ok(installment)
    }

    /// Revert an installment to pending, clearing its paid date. The amount
    /// stays as last set, including any settlement override.
    #[instrument(skip(self), fields(installment_id = %installment_id))]
    pub async fn mark_pending(&self, installment_id: Uuid) -> Result<Installment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_pending"])
            .start_timer();

        let current = self.get_installment(installment_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Installment {} not found", installment_id))
        })?;

        let updated = sqlx::query_as::<_, Installment>(&format!(
            r#"
            UPDATE installments
            SET status = $3, paid_date = NULL,
                row_version = row_version + 1, updated_utc = now()
            WHERE installment_id = $1 AND row_version = $2
            RETURNING {INSTALLMENT_COLUMNS}
            "#,
        ))
        .bind(installment_id)
        .bind(current.row_version)
        .bind(InstallmentStatus::Pendente.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark installment pending: {}", e))
        })?;

        let installment = match updated {
            Some(installment) => installment,
            None => return Err(self.stale_installment(installment_id).await),
        };

        timer.observe_duration();
        info!(installment_id = %installment.installment_id, "Installment reverted to pending");
        record_settlement_operation("mark_pending");

        Ok(installment)
    }

    /// Revert every paid installment to pending in one sweep. Returns the
    /// number of installments reverted.
    #[instrument(skip(self))]
    pub async fn revert_all_paid(&self) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["revert_all_paid"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE installments
            SET status = $1, paid_date = NULL,
                row_version = row_version + 1, updated_utc = now()
            WHERE status = $2
            "#,
        )
        .bind(InstallmentStatus::Pendente.as_str())
        .bind(InstallmentStatus::Pago.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to revert paid installments: {}", e))
        })?;

        timer.observe_duration();
        info!(reverted = result.rows_affected(), "Paid installments reverted");
        record_settlement_operation("revert_all_paid");

        Ok(result.rows_affected())
    }

    /// Generic status setter. The paid date, when present, must be in the
    /// hyphenated year-month-day form; an unparsable string fails validation
    /// before anything is written. Marking paid requires a date; marking
    /// pending clears it. The amount is untouched either way.
    #[instrument(skip(self, paid_date), fields(installment_id = %installment_id))]
    pub async fn update_status_and_date(
        &self,
        installment_id: Uuid,
        status: InstallmentStatus,
        paid_date: Option<&str>,
    ) -> Result<Installment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_status_and_date"])
            .start_timer();

        let parsed = match paid_date {
            Some(s) if !s.is_empty() => Some(parse_paid_date(s)?),
            _ => None,
        };
        let paid_date = match status {
            InstallmentStatus::Pago => Some(parsed.ok_or_else(|| {
                AppError::ValidationError(anyhow::anyhow!(
                    "A paid date is required to mark an installment paid"
                ))
            })?),
            InstallmentStatus::Pendente => None,
        };

        let current = self.get_installment(installment_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Installment {} not found", installment_id))
        })?;

        let updated = sqlx::query_as::<_, Installment>(&format!(
            r#"
            UPDATE installments
            SET status = $3, paid_date = $4,
                row_version = row_version + 1, updated_utc = now()
            WHERE installment_id = $1 AND row_version = $2
            RETURNING {INSTALLMENT_COLUMNS}
            "#,
        ))
        .bind(installment_id)
        .bind(current.row_version)
        .bind(status.as_str())
        .bind(paid_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update installment: {}", e))
        })?;

        let installment = match updated {
            Some(installment) => installment,
            None => return Err(self.stale_installment(installment_id).await),
        };

        timer.observe_duration();
        info!(
            installment_id = %installment.installment_id,
            status = %installment.status,
            "Installment status updated"
        );
        record_settlement_operation("update_status");

        Ok(installment)
    }

    /// Full-row edit of an installment as previously read by the caller. The
    /// row's `row_version` is the concurrency token: if another writer got
    /// there first the edit fails with a conflict and nothing is written.
    #[instrument(skip(self, updated), fields(installment_id = %updated.installment_id))]
    pub async fn update_installment(&self, updated: &Installment) -> Result<Installment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_installment"])
            .start_timer();

        if updated.amount <= Decimal::ZERO {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "Installment amount must be positive, got {}",
                updated.amount
            )));
        }
        let status = updated.parsed_status();
        match (status, updated.paid_date) {
            (InstallmentStatus::Pago, None) => {
                return Err(AppError::ValidationError(anyhow::anyhow!(
                    "A paid installment must carry a paid date"
                )));
            }
            (InstallmentStatus::Pendente, Some(_)) => {
                return Err(AppError::ValidationError(anyhow::anyhow!(
                    "A pending installment cannot carry a paid date"
                )));
            }
            _ => {}
        }

        let row = sqlx::query_as::<_, Installment>(&format!(
            r#"
            UPDATE installments
            SET installment_number = $3, amount = $4, due_date = $5, status = $6, paid_date = $7,
                row_version = row_version + 1, updated_utc = now()
            WHERE installment_id = $1 AND row_version = $2
            RETURNING {INSTALLMENT_COLUMNS}
            "#,
        ))
        .bind(updated.installment_id)
        .bind(updated.row_version)
        .bind(updated.installment_number)
        .bind(updated.amount)
        .bind(updated.due_date)
        .bind(status.as_str())
        .bind(updated.paid_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update installment: {}", e))
        })?;

        let installment = match row {
            Some(installment) => installment,
            None => return Err(self.stale_installment(updated.installment_id).await),
        };

        timer.observe_duration();
        info!(installment_id = %installment.installment_id, "Installment updated");
        record_settlement_operation("update");

        Ok(installment)
    }

    /// Classify a conditional update that matched no row: the installment is
    /// either gone or was modified by a concurrent writer.
    async fn stale_installment(&self, installment_id: Uuid) -> AppError {
        match self.get_installment(installment_id).await {
            Ok(Some(_)) => AppError::Conflict(anyhow::anyhow!(
                "Installment {} was modified concurrently",
                installment_id
            )),
            Ok(None) => {
                AppError::NotFound(anyhow::anyhow!("Installment {} not found", installment_id))
            }
            Err(e) => e,
        }
    }
}
