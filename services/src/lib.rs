//! Business core for the cycle lifecycle and meeting ledger.
//!
//! Each module maps to one subsystem: schedule expansion (`generator`),
//! per-meeting financial stamping (`finance`), the meeting status state
//! machine (`meetings`), cached cycle counters (`progress`), enrollment and
//! payment state (`registrations`), per-meeting attendance (`attendance`),
//! and batch mutation with per-target outcomes (`bulk`). External
//! collaborators (audit sink, notification delivery) are trait seams in
//! `audit` and `events`.

pub mod attendance;
pub mod audit;
pub mod bulk;
pub mod error;
pub mod events;
pub mod finance;
pub mod generator;
pub mod meetings;
pub mod progress;
pub mod registrations;

pub use attendance::{AttendanceTarget, AttendanceTracker};
pub use audit::{AuditRecorder, LogAuditRecorder, Operator};
pub use bulk::{BulkCoordinator, BulkOutcome, BulkReport, MeetingChangeSet, RegistrationChangeSet};
pub use error::{ServiceError, ServiceResult};
pub use events::{LedgerEvent, LogDispatcher, NotificationDispatcher};
pub use generator::{MeetingGenerator, NewCycle};
pub use meetings::{MeetingService, MeetingUpdate};
pub use progress::{CycleProgress, ProgressTracker};
pub use registrations::{PaymentUpdate, RegistrationLedger};
