//! Payment allocation across a student's prior balance and month ledger.

use crate::models::{FeeMonth, MonthLedger, PaymentStatus};

/// Outcome of applying one payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub ledger: MonthLedger,
    pub previous_due: i64,
    /// Part of the payment that found nothing left to settle.
    pub unallocated: i64,
}

/// Applies `payment` to `previous_due` first, then to the ledger slots in
/// calendar order (`Jan` … `Dec`, then `Annual`).
///
/// Slots with nothing due are left untouched. A slot paid off becomes
/// `Paid`; one only reduced becomes `Partial`. Every unit of the payment ends
/// up in exactly one of: the prior-balance reduction, a slot's `paid`, or
/// `unallocated`. A negative prior balance is treated as nothing owed and
/// left as is.
pub fn apply_payment(ledger: &MonthLedger, previous_due: i64, payment: i64) -> Allocation {
    let mut ledger = ledger.clone();
    let mut remaining = payment.max(0);

    let to_prior = remaining.min(previous_due.max(0));
    let previous_due = previous_due - to_prior;
    remaining -= to_prior;

    for month in FeeMonth::ALL {
        if remaining == 0 {
            break;
        }

        let entry = ledger.get_mut(month);
        if entry.due <= 0 {
            continue;
        }

        let to_month = remaining.min(entry.due);
        entry.paid = entry.paid.saturating_add(to_month);
        entry.due -= to_month;
        entry.status = if entry.due == 0 {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Partial
        };
        remaining -= to_month;
    }

    Allocation {
        ledger,
        previous_due,
        unallocated: remaining,
    }
}
