//! Session-scoped business operations.
//!
//! Every call names a session (or falls back to the default one), resolves
//! its store through the [`SessionRegistry`], and runs against that store
//! alone.

use crate::models::{
    next_session, FeeStructure, FeeUpdate, NewReceipt, NewStudent, Receipt, ReceiptOutcome,
    Student, StudentInsert, StudentUpdate, DEFAULT_CLASSES, STANDARD_MONTHLY_FEES,
};
use crate::services::receipts;
use crate::services::registry::SessionRegistry;
use crate::services::store::SessionStore;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

#[derive(Clone)]
pub struct FeeService {
    registry: Arc<SessionRegistry>,
}

impl FeeService {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    async fn store(&self, session: Option<&str>) -> Result<SessionStore, AppError> {
        let session_id = self.registry.session_or_default(session);
        self.registry.resolve(&session_id).await
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    /// Create the session after `from_session`, carrying balances forward, and
    /// add `extra_fee` to every carried student's prior balance.
    #[instrument(skip(self))]
    pub async fn create_next_session(
        &self,
        from_session: &str,
        extra_fee: i64,
    ) -> Result<String, AppError> {
        let next = next_session(from_session.trim())
            .map_err(|e| AppError::BadRequest(anyhow::Error::new(e)))?;

        let store = self.registry.resolve(&next).await?;

        if extra_fee != 0 {
            let _guard = store.lock_writes().await;
            let updated = store.add_to_previous_due(extra_fee).await?;
            info!(session = %next, extra_fee, students = updated, "Extra fee applied");
        }

        Ok(next)
    }

    pub async fn list_sessions(&self) -> Result<Vec<String>, AppError> {
        self.registry.list_sessions().await
    }

    // -------------------------------------------------------------------------
    // Students
    // -------------------------------------------------------------------------

    #[instrument(skip(self, student), fields(class_name = %student.class_name, roll = %student.roll))]
    pub async fn add_student(
        &self,
        session: Option<&str>,
        student: NewStudent,
    ) -> Result<StudentInsert, AppError> {
        student.validate()?;
        let store = self.store(session).await?;

        let _guard = store.lock_writes().await;
        let outcome = store.insert_student(&student.into_draft()).await?;
        if !outcome.is_created() {
            info!("Student already enrolled; nothing added");
        }
        Ok(outcome)
    }

    pub async fn list_students(&self, session: Option<&str>) -> Result<Vec<Student>, AppError> {
        self.store(session).await?.list_students().await
    }

    pub async fn get_student(
        &self,
        session: Option<&str>,
        class_name: &str,
        roll: &str,
    ) -> Result<Student, AppError> {
        self.store(session)
            .await?
            .find_student(class_name, roll)
            .await?
            .ok_or_else(|| student_not_found(class_name, roll))
    }

    #[instrument(skip(self, update))]
    pub async fn update_student(
        &self,
        session: Option<&str>,
        class_name: &str,
        roll: &str,
        update: StudentUpdate,
    ) -> Result<Student, AppError> {
        let store = self.store(session).await?;

        let _guard = store.lock_writes().await;
        let current = store
            .find_student(class_name, roll)
            .await?
            .ok_or_else(|| student_not_found(class_name, roll))?;

        store
            .update_student(current.id, &update.apply_to(&current))
            .await
    }

    /// Remove a student together with their receipts.
    #[instrument(skip(self))]
    pub async fn delete_student(
        &self,
        session: Option<&str>,
        class_name: &str,
        roll: &str,
    ) -> Result<(), AppError> {
        let store = self.store(session).await?;

        let _guard = store.lock_writes().await;
        if store.delete_student(class_name, roll).await? {
            Ok(())
        } else {
            Err(student_not_found(class_name, roll))
        }
    }

    // -------------------------------------------------------------------------
    // Receipts
    // -------------------------------------------------------------------------

    pub async fn record_receipt(
        &self,
        session: Option<&str>,
        receipt: NewReceipt,
    ) -> Result<ReceiptOutcome, AppError> {
        let store = self.store(session).await?;
        receipts::record_receipt(&store, receipt).await
    }

    /// All receipts of the session, newest first.
    pub async fn receipt_history(&self, session: Option<&str>) -> Result<Vec<Receipt>, AppError> {
        self.store(session).await?.list_receipts().await
    }

    #[instrument(skip(self))]
    pub async fn delete_receipt(&self, session: Option<&str>, id: i64) -> Result<(), AppError> {
        if self.store(session).await?.delete_receipt(id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(anyhow::anyhow!("Receipt {} not found", id)))
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_all_receipts(&self, session: Option<&str>) -> Result<u64, AppError> {
        let deleted = self.store(session).await?.delete_all_receipts().await?;
        info!(deleted, "Receipts cleared");
        Ok(deleted)
    }

    // -------------------------------------------------------------------------
    // Fee structure
    // -------------------------------------------------------------------------

    /// The fee schedule, with every default class present.
    pub async fn list_fees(&self, session: Option<&str>) -> Result<Vec<FeeStructure>, AppError> {
        let store = self.store(session).await?;

        let defaults: Vec<(&str, i64)> = DEFAULT_CLASSES.iter().map(|class| (*class, 0)).collect();
        store.insert_missing_fees(&defaults).await?;

        store.list_fees().await
    }

    #[instrument(skip(self, fee), fields(class_name = %fee.class_name))]
    pub async fn update_fee(
        &self,
        session: Option<&str>,
        fee: FeeUpdate,
    ) -> Result<FeeStructure, AppError> {
        fee.validate()?;
        self.store(session)
            .await?
            .upsert_fee(&fee.class_name, fee.monthly_fee, fee.annual_charge)
            .await
    }

    /// Add the standard monthly fee table for classes not yet scheduled.
    /// Returns how many classes were added.
    #[instrument(skip(self))]
    pub async fn setup_default_fees(&self, session: Option<&str>) -> Result<u64, AppError> {
        let inserted = self
            .store(session)
            .await?
            .insert_missing_fees(&STANDARD_MONTHLY_FEES)
            .await?;
        info!(inserted, "Standard fees set up");
        Ok(inserted)
    }
}

fn student_not_found(class_name: &str, roll: &str) -> AppError {
    AppError::NotFound(anyhow::anyhow!(
        "Student {}/{} not found",
        class_name,
        roll
    ))
}
