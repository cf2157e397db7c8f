//! SQLite-backed storage for a single academic session.
//!
//! Every session owns one database file. All reads and writes for students,
//! receipts and the fee schedule of that session go through a
//! [`SessionStore`]; nothing here knows about other sessions.

use crate::models::{
    FeeStructure, MonthLedger, Receipt, ReceiptDraft, ReceiptRow, Student, StudentDraft,
    StudentInsert, StudentRow,
};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::Utc;
use prometheus::HistogramTimer;
use service_core::error::AppError;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, instrument};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const STUDENT_COLUMNS: &str =
    "id, name, father, class_name, roll, previous_due, advance, months, annual_charge, created_utc";

const RECEIPT_COLUMNS: &str = "id, name, father, class_name, roll, date, total_paid, total_due, \
     advance, annual_charge, months_json, receipt_key, receipt_number, created_utc";

fn timer(operation: &str) -> HistogramTimer {
    DB_QUERY_DURATION
        .with_label_values(&[operation])
        .start_timer()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Connection settings applied to every session pool.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Ledger and prior balance written alongside a receipt.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceUpdate {
    pub student_id: i64,
    pub previous_due: i64,
    pub months: MonthLedger,
}

/// Handle to one session's database.
///
/// Cloning is cheap; clones share the pool and the write lock.
#[derive(Debug, Clone)]
pub struct SessionStore {
    session_id: Arc<str>,
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl SessionStore {
    /// Open (creating if missing) the database file at `path`.
    #[instrument(skip(path, options), fields(path = %path.display()))]
    pub async fn open(
        session_id: &str,
        path: &Path,
        options: &StoreOptions,
    ) -> Result<Self, AppError> {
        let connect_options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(options.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect_options)
            .await
            .map_err(|e| AppError::database("Failed to open session store", e))?;

        info!(
            max_connections = options.max_connections,
            "Session store opened"
        );

        Ok(Self {
            session_id: Arc::from(session_id),
            pool,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Serializes read-modify-write sequences against this store.
    pub async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Apply pending schema migrations.
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        MIGRATOR.run(&self.pool).await?;
        info!("Session schema up to date");
        Ok(())
    }

    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database("Health check failed", e))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // -------------------------------------------------------------------------
    // Student Operations
    // -------------------------------------------------------------------------

    /// Insert a student unless `(class_name, roll)` is already taken.
    #[instrument(skip(self, draft), fields(session = %self.session_id, class_name = %draft.class_name, roll = %draft.roll))]
    pub async fn insert_student(&self, draft: &StudentDraft) -> Result<StudentInsert, AppError> {
        let _timer = timer("insert_student");

        let row = sqlx::query_as::<_, StudentRow>(&format!(
            r#"
            INSERT INTO student (name, father, class_name, roll, previous_due, advance, months, annual_charge, created_utc)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (class_name, roll) DO NOTHING
            RETURNING {STUDENT_COLUMNS}
            "#
        ))
        .bind(&draft.name)
        .bind(&draft.father)
        .bind(&draft.class_name)
        .bind(&draft.roll)
        .bind(draft.previous_due)
        .bind(draft.advance)
        .bind(draft.months.to_json_string()?)
        .bind(draft.annual_charge())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database("Failed to insert student", e))?;

        Ok(match row {
            Some(row) => StudentInsert::Created(row.into()),
            None => StudentInsert::AlreadyExists,
        })
    }

    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn list_students(&self) -> Result<Vec<Student>, AppError> {
        let _timer = timer("list_students");

        let rows = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM student ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database("Failed to list students", e))?;

        Ok(rows.into_iter().map(Student::from).collect())
    }

    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn find_student(
        &self,
        class_name: &str,
        roll: &str,
    ) -> Result<Option<Student>, AppError> {
        let _timer = timer("find_student");

        let row = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM student WHERE class_name = ?1 AND roll = ?2"
        ))
        .bind(class_name)
        .bind(roll)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database("Failed to get student", e))?;

        Ok(row.map(Student::from))
    }

    /// Overwrite a student's editable fields. Moving onto an occupied
    /// `(class_name, roll)` is a conflict.
    #[instrument(skip(self, draft), fields(session = %self.session_id, student_id = id))]
    pub async fn update_student(&self, id: i64, draft: &StudentDraft) -> Result<Student, AppError> {
        let _timer = timer("update_student");

        let row = sqlx::query_as::<_, StudentRow>(&format!(
            r#"
            UPDATE student
            SET name = ?1, father = ?2, class_name = ?3, roll = ?4, previous_due = ?5,
                advance = ?6, months = ?7, annual_charge = ?8
            WHERE id = ?9
            RETURNING {STUDENT_COLUMNS}
            "#
        ))
        .bind(&draft.name)
        .bind(&draft.father)
        .bind(&draft.class_name)
        .bind(&draft.roll)
        .bind(draft.previous_due)
        .bind(draft.advance)
        .bind(draft.months.to_json_string()?)
        .bind(draft.annual_charge())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(anyhow::anyhow!(
                    "Student {}/{} already exists",
                    draft.class_name,
                    draft.roll
                ))
            } else {
                AppError::database("Failed to update student", e)
            }
        })?;

        row.map(Student::from)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Student not found")))
    }

    /// Delete a student and every receipt filed under the same
    /// `(class_name, roll)`. Returns `false` when no such student exists.
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn delete_student(&self, class_name: &str, roll: &str) -> Result<bool, AppError> {
        let _timer = timer("delete_student");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database("Failed to begin transaction", e))?;

        let deleted = sqlx::query("DELETE FROM student WHERE class_name = ?1 AND roll = ?2")
            .bind(class_name)
            .bind(roll)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database("Failed to delete student", e))?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await.ok();
            return Ok(false);
        }

        let receipts = sqlx::query("DELETE FROM receipt WHERE class_name = ?1 AND roll = ?2")
            .bind(class_name)
            .bind(roll)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database("Failed to delete student receipts", e))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| AppError::database("Failed to commit student deletion", e))?;

        info!(receipts_deleted = receipts, "Student deleted");
        Ok(true)
    }

    /// Add `amount` to every student's prior balance.
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn add_to_previous_due(&self, amount: i64) -> Result<u64, AppError> {
        let _timer = timer("add_to_previous_due");

        let updated = sqlx::query("UPDATE student SET previous_due = previous_due + ?1")
            .bind(amount)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database("Failed to adjust previous dues", e))?
            .rows_affected();

        Ok(updated)
    }

    // -------------------------------------------------------------------------
    // Receipt Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn find_receipt_number(&self, receipt_key: &str) -> Result<Option<String>, AppError> {
        let _timer = timer("find_receipt_number");

        sqlx::query_scalar::<_, String>("SELECT receipt_number FROM receipt WHERE receipt_key = ?1")
            .bind(receipt_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database("Failed to check receipt key", e))
    }

    /// Next receipt sequence: one past the highest id this store has ever
    /// issued, so deleted receipts never free their number for reuse.
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn next_receipt_sequence(&self) -> Result<i64, AppError> {
        let _timer = timer("next_receipt_sequence");

        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT MAX(
                COALESCE((SELECT seq FROM sqlite_sequence WHERE name = 'receipt'), 0),
                COALESCE((SELECT MAX(id) FROM receipt), 0)
            ) + 1
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database("Failed to read receipt sequence", e))
    }

    /// Insert a receipt under `sequence` and, in the same transaction, apply
    /// the student's balance change. A reused receipt key is a conflict.
    #[instrument(skip(self, draft, balance), fields(session = %self.session_id, receipt_number = %draft.receipt_number))]
    pub async fn insert_receipt(
        &self,
        sequence: i64,
        draft: &ReceiptDraft,
        balance: Option<&BalanceUpdate>,
    ) -> Result<Receipt, AppError> {
        let _timer = timer("insert_receipt");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database("Failed to begin transaction", e))?;

        let row = sqlx::query_as::<_, ReceiptRow>(&format!(
            r#"
            INSERT INTO receipt (id, name, father, class_name, roll, date, total_paid, total_due,
                                 advance, annual_charge, months_json, receipt_key, receipt_number, created_utc)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            RETURNING {RECEIPT_COLUMNS}
            "#
        ))
        .bind(sequence)
        .bind(&draft.name)
        .bind(&draft.father)
        .bind(&draft.class_name)
        .bind(&draft.roll)
        .bind(&draft.date)
        .bind(draft.total_paid)
        .bind(draft.total_due)
        .bind(draft.advance)
        .bind(draft.annual_charge)
        .bind(serde_json::to_string(&draft.months)?)
        .bind(&draft.receipt_key)
        .bind(&draft.receipt_number)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(anyhow::anyhow!("Duplicate receipt key"))
            } else {
                AppError::database("Failed to insert receipt", e)
            }
        })?;

        if let Some(balance) = balance {
            sqlx::query(
                "UPDATE student SET previous_due = ?1, months = ?2, annual_charge = ?3 WHERE id = ?4",
            )
            .bind(balance.previous_due)
            .bind(balance.months.to_json_string()?)
            .bind(balance.months.annual_paid())
            .bind(balance.student_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database("Failed to update student balance", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::database("Failed to commit receipt", e))?;

        Ok(row.into())
    }

    /// All receipts, newest first.
    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn list_receipts(&self) -> Result<Vec<Receipt>, AppError> {
        let _timer = timer("list_receipts");

        let rows = sqlx::query_as::<_, ReceiptRow>(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM receipt ORDER BY id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database("Failed to list receipts", e))?;

        Ok(rows.into_iter().map(Receipt::from).collect())
    }

    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn delete_receipt(&self, id: i64) -> Result<bool, AppError> {
        let _timer = timer("delete_receipt");

        let deleted = sqlx::query("DELETE FROM receipt WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database("Failed to delete receipt", e))?
            .rows_affected();

        Ok(deleted > 0)
    }

    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn delete_all_receipts(&self) -> Result<u64, AppError> {
        let _timer = timer("delete_all_receipts");

        let deleted = sqlx::query("DELETE FROM receipt")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database("Failed to delete receipts", e))?
            .rows_affected();

        Ok(deleted)
    }

    // -------------------------------------------------------------------------
    // Fee Structure Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn list_fees(&self) -> Result<Vec<FeeStructure>, AppError> {
        let _timer = timer("list_fees");

        sqlx::query_as::<_, FeeStructure>(
            "SELECT id, class_name, monthly_fee, annual_charge FROM fee_structure ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database("Failed to list fee structure", e))
    }

    /// Insert `(class_name, monthly_fee)` rows for classes not yet present.
    /// Returns how many rows were added.
    #[instrument(skip(self, fees), fields(session = %self.session_id, classes = fees.len()))]
    pub async fn insert_missing_fees(&self, fees: &[(&str, i64)]) -> Result<u64, AppError> {
        let _timer = timer("insert_missing_fees");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database("Failed to begin transaction", e))?;

        let mut inserted = 0;
        for (class_name, monthly_fee) in fees {
            inserted += sqlx::query(
                r#"
                INSERT INTO fee_structure (class_name, monthly_fee, annual_charge)
                VALUES (?1, ?2, 0)
                ON CONFLICT (class_name) DO NOTHING
                "#,
            )
            .bind(*class_name)
            .bind(*monthly_fee)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database("Failed to insert fee structure", e))?
            .rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| AppError::database("Failed to commit fee structure", e))?;

        Ok(inserted)
    }

    #[instrument(skip(self), fields(session = %self.session_id))]
    pub async fn upsert_fee(
        &self,
        class_name: &str,
        monthly_fee: i64,
        annual_charge: i64,
    ) -> Result<FeeStructure, AppError> {
        let _timer = timer("upsert_fee");

        sqlx::query_as::<_, FeeStructure>(
            r#"
            INSERT INTO fee_structure (class_name, monthly_fee, annual_charge)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (class_name) DO UPDATE
            SET monthly_fee = excluded.monthly_fee, annual_charge = excluded.annual_charge
            RETURNING id, class_name, monthly_fee, annual_charge
            "#,
        )
        .bind(class_name)
        .bind(monthly_fee)
        .bind(annual_charge)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database("Failed to update fee structure", e))
    }
}
