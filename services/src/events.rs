//! Notification events emitted by the ledger.
//!
//! Delivery (WhatsApp, email) lives outside this core; the dispatcher is
//! invoked fire-and-forget and its failures never roll back a mutation.

use chrono::NaiveDate;
use db::models::registration::PaymentStatus;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LedgerEvent {
    MeetingCompleted {
        meeting_id: i64,
        cycle_id: i64,
        scheduled_date: NaiveDate,
    },
    MeetingCancelled {
        meeting_id: i64,
        cycle_id: i64,
        scheduled_date: NaiveDate,
    },
    PaymentStatusChanged {
        registration_id: i64,
        cycle_id: i64,
        student_id: i64,
        from: PaymentStatus,
        to: PaymentStatus,
    },
}

impl LedgerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::MeetingCompleted { .. } => "meeting_completed",
            LedgerEvent::MeetingCancelled { .. } => "meeting_cancelled",
            LedgerEvent::PaymentStatusChanged { .. } => "payment_status_changed",
        }
    }
}

pub trait NotificationDispatcher: Send + Sync {
    fn notify(&self, event: LedgerEvent);
}

/// Default dispatcher that only logs the event.
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn notify(&self, event: LedgerEvent) {
        info!(event_type = event.event_type(), ?event, "ledger event");
    }
}
