//! Test helper module for receivables-engine integration tests.
//!
//! Provides common setup utilities for PostgreSQL-based tests. Each test gets
//! its own schema; tests skip cleanly when `TEST_DATABASE_URL` is not set.

#![allow(dead_code)]

use receivables_engine::models::{CreatePlan, PaymentType, PlanWithInstallments, Receivable};
use receivables_engine::services::{init_metrics, Database};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

// Counter for unique schema names
static SCHEMA_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Generate a unique schema name for test isolation.
fn unique_schema_name() -> String {
    let counter = SCHEMA_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("test_receivables_{}_{}", std::process::id(), counter)
}

/// Database handle bound to a schema provisioned for one test.
pub struct TestDb {
    pub db: Database,
    schema_name: String,
}

impl TestDb {
    /// Provision a fresh schema and a migrated database handle against it.
    /// Returns `None` (test skipped) when `TEST_DATABASE_URL` is not set.
    pub async fn spawn() -> Option<Self> {
        let base_url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("TEST_DATABASE_URL not set; skipping database test");
                return None;
            }
        };

        init_metrics();

        let schema_name = unique_schema_name();

        // Create schema for test isolation
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&base_url)
            .await
            .expect("Failed to connect to test database");

        sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema_name))
            .execute(&pool)
            .await
            .ok();
        sqlx::query(&format!("CREATE SCHEMA {}", schema_name))
            .execute(&pool)
            .await
            .expect("Failed to create test schema");

        pool.close().await;

        // Use ? or & depending on whether URL already has query parameters
        let separator = if base_url.contains('?') { "&" } else { "?" };
        let db_url = format!(
            "{}{}options=-c search_path%3D{}",
            base_url, separator, schema_name
        );

        let db = Database::new(&db_url, 5, 1)
            .await
            .expect("Failed to create test database");
        db.run_migrations()
            .await
            .expect("Failed to run migrations");

        Some(Self { db, schema_name })
    }

    /// Drop the schema created for this test.
    pub async fn cleanup(self) {
        sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", self.schema_name))
            .execute(self.db.pool())
            .await
            .ok();
    }
}

/// Insert a receivable for a fresh project/unit pair.
pub async fn seed_receivable(db: &Database) -> Receivable {
    db.create_receivable(&receivables_engine::models::CreateReceivable {
        project_id: Uuid::new_v4(),
        unit_id: Some(Uuid::new_v4()),
        description: Some("Venda unidade teste".to_string()),
    })
    .await
    .expect("Failed to seed receivable")
}

/// Insert a receivable plus a monthly plan over it.
pub async fn seed_plan(db: &Database, count: i32, total: Decimal) -> PlanWithInstallments {
    let receivable = seed_receivable(db).await;
    db.create_plan(&CreatePlan {
        receivable_id: receivable.receivable_id,
        payment_type: PaymentType::Mensal,
        installment_count: count,
        total_amount: total,
    })
    .await
    .expect("Failed to seed plan")
}
