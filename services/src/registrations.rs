//! Enrollment and payment state for students in a cycle.
//!
//! A student holds at most one non-cancelled registration per cycle.
//! Payment fields move independently of enrollment status; cancelling an
//! enrollment never touches attendance history.

use std::sync::Arc;

use chrono::Utc;
use db::models::registration::{PaymentStatus, RegistrationStatus};
use db::models::{cycle, registration, student};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use tracing::info;

use crate::audit::{snapshot, AuditRecorder, Operator};
use crate::error::{ServiceError, ServiceResult};
use crate::events::{LedgerEvent, NotificationDispatcher};

/// Sparse payment update; unset fields keep their prior value.
#[derive(Debug, Clone, Default)]
pub struct PaymentUpdate {
    pub amount_owed: Option<f64>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<String>,
    pub invoice_link: Option<String>,
    pub notes: Option<String>,
}

impl PaymentUpdate {
    pub fn is_empty(&self) -> bool {
        self.amount_owed.is_none()
            && self.payment_status.is_none()
            && self.payment_method.is_none()
            && self.invoice_link.is_none()
            && self.notes.is_none()
    }
}

#[derive(Clone)]
pub struct RegistrationLedger {
    db: DatabaseConnection,
    audit: Arc<dyn AuditRecorder>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl RegistrationLedger {
    pub fn new(
        db: DatabaseConnection,
        audit: Arc<dyn AuditRecorder>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            db,
            audit,
            notifier,
        }
    }

    async fn load(&self, registration_id: i64) -> ServiceResult<registration::Model> {
        registration::Entity::find_by_id(registration_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("registration {} not found", registration_id))
            })
    }

    /// Enroll a student into a cycle.
    ///
    /// Fails with a conflict while a non-cancelled registration exists for the
    /// pair; re-enrolling after cancellation is allowed.
    pub async fn enroll(
        &self,
        operator: &Operator,
        student_id: i64,
        cycle_id: i64,
        amount_owed: f64,
        status: RegistrationStatus,
    ) -> ServiceResult<registration::Model> {
        if status == RegistrationStatus::Cancelled {
            return Err(ServiceError::Validation(
                "cannot enroll directly into cancelled status".into(),
            ));
        }
        if student::Entity::find_by_id(student_id)
            .one(&self.db)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound(format!(
                "student {} not found",
                student_id
            )));
        }
        if cycle::Entity::find_by_id(cycle_id)
            .one(&self.db)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound(format!(
                "cycle {} not found",
                cycle_id
            )));
        }

        let existing = registration::Entity::find()
            .filter(registration::Column::CycleId.eq(cycle_id))
            .filter(registration::Column::StudentId.eq(student_id))
            .filter(registration::Column::Status.ne(RegistrationStatus::Cancelled))
            .one(&self.db)
            .await?;
        if let Some(existing) = existing {
            return Err(ServiceError::Conflict(format!(
                "student {} already holds registration {} in cycle {}",
                student_id, existing.id, cycle_id
            )));
        }

        let now = Utc::now();
        let created = registration::ActiveModel {
            cycle_id: Set(cycle_id),
            student_id: Set(student_id),
            status: Set(status),
            amount_owed: Set(amount_owed),
            payment_status: Set(PaymentStatus::Unpaid),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        info!(
            registration_id = created.id,
            student_id, cycle_id, "enrolled student"
        );
        self.audit.record(
            operator,
            "registration.enroll",
            "registration",
            created.id,
            None,
            snapshot(&created),
        );
        Ok(created)
    }

    /// Partial payment-state update; emits a notification when the payment
    /// status itself changes.
    pub async fn update_payment(
        &self,
        operator: &Operator,
        registration_id: i64,
        update: PaymentUpdate,
    ) -> ServiceResult<registration::Model> {
        if update.is_empty() {
            return Err(ServiceError::Validation(
                "payment update contains no fields".into(),
            ));
        }
        let current = self.load(registration_id).await?;
        let before = snapshot(&current);
        let previous_status = current.payment_status;

        let mut active: registration::ActiveModel = current.into();
        if let Some(amount) = update.amount_owed {
            active.amount_owed = Set(amount);
        }
        if let Some(status) = update.payment_status {
            active.payment_status = Set(status);
        }
        if let Some(method) = update.payment_method {
            active.payment_method = Set(Some(method));
        }
        if let Some(link) = update.invoice_link {
            active.invoice_link = Set(Some(link));
        }
        if let Some(notes) = update.notes {
            active.notes = Set(Some(notes));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&self.db).await?;

        self.audit.record(
            operator,
            "registration.update_payment",
            "registration",
            updated.id,
            before,
            snapshot(&updated),
        );
        if updated.payment_status != previous_status {
            self.notifier.notify(LedgerEvent::PaymentStatusChanged {
                registration_id: updated.id,
                cycle_id: updated.cycle_id,
                student_id: updated.student_id,
                from: previous_status,
                to: updated.payment_status,
            });
        }
        Ok(updated)
    }

    /// Enrollment status change outside the cancel path (e.g. `registered`
    /// to `active`). Cancelled registrations are terminal.
    pub async fn update_status(
        &self,
        operator: &Operator,
        registration_id: i64,
        status: RegistrationStatus,
    ) -> ServiceResult<registration::Model> {
        if status == RegistrationStatus::Cancelled {
            return self.cancel(operator, registration_id, "status change").await;
        }
        let current = self.load(registration_id).await?;
        if current.status == RegistrationStatus::Cancelled {
            return Err(ServiceError::InvalidState(format!(
                "registration {} is cancelled and terminal",
                registration_id
            )));
        }
        let before = snapshot(&current);

        let mut active: registration::ActiveModel = current.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&self.db).await?;

        self.audit.record(
            operator,
            "registration.update_status",
            "registration",
            updated.id,
            before,
            snapshot(&updated),
        );
        Ok(updated)
    }

    /// Terminal cancellation. Stamps the date and reason; attendance history
    /// stays untouched, and the payment axis keeps whatever it showed.
    pub async fn cancel(
        &self,
        operator: &Operator,
        registration_id: i64,
        reason: &str,
    ) -> ServiceResult<registration::Model> {
        let current = self.load(registration_id).await?;
        if current.status == RegistrationStatus::Cancelled {
            return Err(ServiceError::InvalidState(format!(
                "registration {} is already cancelled",
                registration_id
            )));
        }
        let before = snapshot(&current);

        let mut active: registration::ActiveModel = current.into();
        active.status = Set(RegistrationStatus::Cancelled);
        active.cancelled_at = Set(Some(Utc::now()));
        active.cancellation_reason = Set(Some(reason.to_owned()));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&self.db).await?;

        self.audit.record(
            operator,
            "registration.cancel",
            "registration",
            updated.id,
            before,
            snapshot(&updated),
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::LogAuditRecorder;
    use crate::events::LogDispatcher;
    use crate::generator::{MeetingGenerator, NewCycle};
    use chrono::{NaiveDate, NaiveTime};
    use db::models::cycle::{PricingMode, Weekday};
    use db::models::instructor_rate::ActivityType;
    use db::test_utils::{create_instructor, create_student, set_rate, setup_test_db};

    async fn harness() -> (DatabaseConnection, RegistrationLedger, cycle::Model, i64) {
        let db = setup_test_db().await;
        let instructor = create_instructor(&db, "Noa").await;
        set_rate(&db, instructor.id, ActivityType::Frontal, 100.0).await;

        let generator = MeetingGenerator::new(db.clone(), Arc::new(LogAuditRecorder));
        let (cycle, _) = generator
            .create_cycle(
                &Operator::new(1, "back office"),
                NewCycle {
                    course_name: "Scratch".into(),
                    branch: None,
                    instructor_id: instructor.id,
                    pricing_mode: PricingMode::PerStudent,
                    price_per_student: 75.0,
                    fixed_meeting_revenue: 0.0,
                    vat_inclusive: false,
                    weekday: Weekday::Tuesday,
                    start_time: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
                    end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                    start_date: NaiveDate::from_ymd_opt(2026, 1, 6).unwrap(),
                    end_date: None,
                    total_meetings: 4,
                    activity_type: ActivityType::Frontal,
                },
            )
            .await
            .unwrap();

        let student = create_student(&db, "Dana").await;
        let ledger = RegistrationLedger::new(
            db.clone(),
            Arc::new(LogAuditRecorder),
            Arc::new(LogDispatcher),
        );
        (db, ledger, cycle, student.id)
    }

    #[tokio::test]
    async fn duplicate_active_enrollment_conflicts() {
        let (_db, ledger, cycle, student_id) = harness().await;
        let operator = Operator::new(1, "back office");

        ledger
            .enroll(&operator, student_id, cycle.id, 300.0, RegistrationStatus::Active)
            .await
            .unwrap();
        let err = ledger
            .enroll(&operator, student_id, cycle.id, 300.0, RegistrationStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn reenrollment_after_cancel_succeeds() {
        let (_db, ledger, cycle, student_id) = harness().await;
        let operator = Operator::new(1, "back office");

        let first = ledger
            .enroll(&operator, student_id, cycle.id, 300.0, RegistrationStatus::Active)
            .await
            .unwrap();
        let cancelled = ledger
            .cancel(&operator, first.id, "moved away")
            .await
            .unwrap();
        assert_eq!(cancelled.status, RegistrationStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("moved away"));

        let second = ledger
            .enroll(&operator, student_id, cycle.id, 300.0, RegistrationStatus::Active)
            .await
            .unwrap();
        assert_ne!(second.id, first.id);
    }

    #[tokio::test]
    async fn payment_update_is_partial() {
        let (_db, ledger, cycle, student_id) = harness().await;
        let operator = Operator::new(1, "back office");

        let reg = ledger
            .enroll(&operator, student_id, cycle.id, 300.0, RegistrationStatus::Active)
            .await
            .unwrap();

        let updated = ledger
            .update_payment(
                &operator,
                reg.id,
                PaymentUpdate {
                    payment_status: Some(PaymentStatus::Partial),
                    payment_method: Some("bank transfer".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.payment_status, PaymentStatus::Partial);
        assert_eq!(updated.payment_method.as_deref(), Some("bank transfer"));
        // Unspecified fields keep their prior value.
        assert_eq!(updated.amount_owed, 300.0);
        assert_eq!(updated.status, RegistrationStatus::Active);

        let err = ledger
            .update_payment(&operator, reg.id, PaymentUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn status_change_to_cancelled_delegates_to_cancel() {
        let (_db, ledger, cycle, student_id) = harness().await;
        let operator = Operator::new(1, "back office");

        let reg = ledger
            .enroll(&operator, student_id, cycle.id, 300.0, RegistrationStatus::Active)
            .await
            .unwrap();
        let cancelled = ledger
            .update_status(&operator, reg.id, RegistrationStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status, RegistrationStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("status change"));
    }

    #[tokio::test]
    async fn cancelled_registration_keeps_payment_axis() {
        let (_db, ledger, cycle, student_id) = harness().await;
        let operator = Operator::new(1, "back office");

        let reg = ledger
            .enroll(&operator, student_id, cycle.id, 300.0, RegistrationStatus::Active)
            .await
            .unwrap();
        ledger
            .update_payment(
                &operator,
                reg.id,
                PaymentUpdate {
                    payment_status: Some(PaymentStatus::Paid),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let cancelled = ledger.cancel(&operator, reg.id, "refund waived").await.unwrap();
        assert_eq!(cancelled.payment_status, PaymentStatus::Paid);

        let err = ledger.cancel(&operator, reg.id, "again").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn unknown_references_are_not_found() {
        let (_db, ledger, cycle, student_id) = harness().await;
        let operator = Operator::new(1, "back office");

        let err = ledger
            .enroll(&operator, 9999, cycle.id, 0.0, RegistrationStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = ledger
            .enroll(&operator, student_id, 9999, 0.0, RegistrationStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
