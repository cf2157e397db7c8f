//! Seeding a new session with the outstanding balances of the previous one.

use crate::models::{previous_session, MonthLedger, StudentDraft, StudentInsert};
use crate::services::metrics::CARRY_FORWARD_STUDENTS;
use crate::services::registry::SessionRegistry;
use crate::services::store::SessionStore;
use service_core::error::AppError;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarryForwardReport {
    /// Session the balances were read from, when the new id had one.
    pub previous_session: Option<String>,
    pub seeded: u64,
    /// Students already present in the new session.
    pub skipped: u64,
    pub failed: u64,
}

/// Copy every student of the previous session into `store` with their unpaid
/// dues as the new prior balance and a fresh, all-zero month ledger.
///
/// A malformed session id or a missing previous store is not an error: the
/// report just comes back empty. A student that fails to insert is logged
/// and counted without stopping the rest of the batch.
#[instrument(skip(registry, store), fields(session = %store.session_id()))]
pub async fn seed_from_previous(
    registry: &SessionRegistry,
    store: &SessionStore,
) -> Result<CarryForwardReport, AppError> {
    let mut report = CarryForwardReport::default();

    let Some(previous) = previous_session(store.session_id()) else {
        debug!("No previous session to carry forward from");
        return Ok(report);
    };
    report.previous_session = Some(previous.clone());

    let Some(previous_store) = registry.resolve_existing(&previous).await? else {
        debug!(previous_session = %previous, "Previous session has no store");
        return Ok(report);
    };

    let students = previous_store.list_students().await?;
    let _guard = store.lock_writes().await;

    for student in students {
        let draft = StudentDraft {
            previous_due: student.months.carry_forward(),
            name: student.name,
            father: student.father,
            class_name: student.class_name,
            roll: student.roll,
            advance: 0,
            months: MonthLedger::new(),
        };

        let outcome = match store.insert_student(&draft).await {
            Ok(StudentInsert::Created(_)) => {
                report.seeded += 1;
                "seeded"
            }
            Ok(StudentInsert::AlreadyExists) => {
                report.skipped += 1;
                "skipped"
            }
            Err(e) => {
                warn!(
                    class_name = %draft.class_name,
                    roll = %draft.roll,
                    error = %e,
                    "Failed to carry student forward"
                );
                report.failed += 1;
                "failed"
            }
        };
        CARRY_FORWARD_STUDENTS.with_label_values(&[outcome]).inc();
    }

    Ok(report)
}
