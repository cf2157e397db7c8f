//! Receipt numbering and recording.

use crate::models::{NewReceipt, ReceiptDraft, ReceiptMonths, ReceiptOutcome};
use crate::services::allocation::apply_payment;
use crate::services::metrics::RECEIPTS_TOTAL;
use crate::services::store::{BalanceUpdate, SessionStore};
use service_core::error::AppError;
use tracing::{debug, info, instrument};
use validator::Validate;

/// `<session>-<class>-<roll>-<sequence>` with a six-digit, zero-padded
/// sequence.
pub fn format_receipt_number(session_id: &str, class_name: &str, roll: &str, sequence: i64) -> String {
    format!("{session_id}-{class_name}-{roll}-{sequence:06}")
}

/// Record a payment in `store`.
///
/// A `receipt_key` seen before returns the original receipt number and
/// changes nothing. Otherwise the receipt is written and, if a student with
/// the same class and roll exists, the payment is applied to their prior
/// balance and month ledger in the same transaction. Any part of the payment
/// left over after every due is settled is not recorded.
#[instrument(
    skip(store, payload),
    fields(
        session = %store.session_id(),
        class_name = %payload.class_name,
        roll = %payload.roll,
        receipt_key = %payload.receipt_key
    )
)]
pub async fn record_receipt(
    store: &SessionStore,
    payload: NewReceipt,
) -> Result<ReceiptOutcome, AppError> {
    payload.validate()?;
    let months = ReceiptMonths::normalize(&payload.months);

    let _guard = store.lock_writes().await;

    if let Some(existing) = store.find_receipt_number(&payload.receipt_key).await? {
        RECEIPTS_TOTAL.with_label_values(&["duplicate"]).inc();
        info!(receipt_number = %existing, "Duplicate receipt key ignored");
        return Ok(ReceiptOutcome::Duplicate(existing));
    }

    let sequence = store.next_receipt_sequence().await?;
    let receipt_number =
        format_receipt_number(store.session_id(), &payload.class_name, &payload.roll, sequence);

    let balance = store
        .find_student(&payload.class_name, &payload.roll)
        .await?
        .map(|student| {
            let allocation = apply_payment(&student.months, student.previous_due, payload.total_paid);
            if allocation.unallocated > 0 {
                debug!(
                    unallocated = allocation.unallocated,
                    "Payment exceeds outstanding dues"
                );
            }
            BalanceUpdate {
                student_id: student.id,
                previous_due: allocation.previous_due,
                months: allocation.ledger,
            }
        });

    if balance.is_none() {
        debug!("No matching student; recording receipt without a ledger update");
    }

    let draft = ReceiptDraft {
        name: payload.name,
        father: payload.father,
        class_name: payload.class_name,
        roll: payload.roll,
        date: payload.date,
        total_paid: payload.total_paid,
        total_due: payload.total_due,
        advance: payload.advance,
        annual_charge: months.annual_paid(),
        months,
        receipt_key: payload.receipt_key,
        receipt_number,
    };

    let receipt = store.insert_receipt(sequence, &draft, balance.as_ref()).await?;

    RECEIPTS_TOTAL.with_label_values(&["recorded"]).inc();
    info!(receipt_number = %receipt.receipt_number, "Receipt recorded");

    Ok(ReceiptOutcome::Recorded(receipt.receipt_number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_numbers_pad_the_sequence_to_six_digits() {
        assert_eq!(
            format_receipt_number("2024_25", "5th", "12", 7),
            "2024_25-5th-12-000007"
        );
        assert_eq!(
            format_receipt_number("2024_25", "11th Arts", "A3", 1_234_567),
            "2024_25-11th Arts-A3-1234567"
        );
    }
}
