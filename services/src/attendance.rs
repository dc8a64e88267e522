//! Attendance recording, one outcome per (meeting, student).
//!
//! Recording is idempotent by design: a second call for the same pair
//! overwrites the first record instead of appending. Records are only taken
//! for completed meetings, except for explicit trial seeding ahead of
//! completion.

use std::sync::Arc;

use chrono::Utc;
use db::models::attendance_record::AttendanceStatus;
use db::models::meeting::MeetingStatus;
use db::models::{attendance_record, meeting, registration, student};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

use crate::audit::{snapshot, AuditRecorder, Operator};
use crate::error::{ServiceError, ServiceResult};

/// Who the attendance outcome belongs to: an enrolled student via their
/// registration, or a bare student for trial/guest attendance.
#[derive(Debug, Clone, Copy)]
pub enum AttendanceTarget {
    Registration(i64),
    Student(i64),
}

#[derive(Clone)]
pub struct AttendanceTracker {
    db: DatabaseConnection,
    audit: Arc<dyn AuditRecorder>,
}

impl AttendanceTracker {
    pub fn new(db: DatabaseConnection, audit: Arc<dyn AuditRecorder>) -> Self {
        Self { db, audit }
    }

    /// Record (or overwrite) the attendance outcome for one target.
    ///
    /// `trial_seed` is the explicit accommodation for seeding a trial/guest
    /// record before the meeting completes; it only applies to bare-student
    /// targets.
    pub async fn record(
        &self,
        operator: &Operator,
        meeting_id: i64,
        target: AttendanceTarget,
        status: AttendanceStatus,
        trial_seed: bool,
    ) -> ServiceResult<attendance_record::Model> {
        let meeting = meeting::Entity::find_by_id(meeting_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("meeting {} not found", meeting_id))
            })?;

        let trial = matches!(target, AttendanceTarget::Student(_)) && trial_seed;
        if meeting.status != MeetingStatus::Completed && !trial {
            return Err(ServiceError::InvalidState(format!(
                "meeting {} is {}; attendance is only recorded for completed meetings",
                meeting_id, meeting.status
            )));
        }

        let (registration_id, student_id) = match target {
            AttendanceTarget::Registration(reg_id) => {
                let reg = registration::Entity::find_by_id(reg_id)
                    .one(&self.db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("registration {} not found", reg_id))
                    })?;
                if reg.cycle_id != meeting.cycle_id {
                    return Err(ServiceError::Validation(format!(
                        "registration {} belongs to cycle {}, not to the meeting's cycle {}",
                        reg_id, reg.cycle_id, meeting.cycle_id
                    )));
                }
                (Some(reg.id), reg.student_id)
            }
            AttendanceTarget::Student(student_id) => {
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
                (None, student_id)
            }
        };

        let existing = attendance_record::Entity::find()
            .filter(attendance_record::Column::MeetingId.eq(meeting_id))
            .filter(attendance_record::Column::StudentId.eq(student_id))
            .one(&self.db)
            .await?;

        let record = match existing {
            Some(existing) => {
                let before = snapshot(&existing);
                let mut active: attendance_record::ActiveModel = existing.into();
                active.status = Set(status);
                active.recorded_at = Set(Utc::now());
                if registration_id.is_some() {
                    active.registration_id = Set(registration_id);
                }
                let updated = active.update(&self.db).await?;
                self.audit.record(
                    operator,
                    "attendance.overwrite",
                    "attendance_record",
                    updated.id,
                    before,
                    snapshot(&updated),
                );
                updated
            }
            None => {
                let created = attendance_record::ActiveModel {
                    meeting_id: Set(meeting_id),
                    registration_id: Set(registration_id),
                    student_id: Set(student_id),
                    status: Set(status),
                    recorded_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(&self.db)
                .await?;
                self.audit.record(
                    operator,
                    "attendance.record",
                    "attendance_record",
                    created.id,
                    None,
                    snapshot(&created),
                );
                created
            }
        };

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::LogAuditRecorder;
    use crate::events::LogDispatcher;
    use crate::generator::{MeetingGenerator, NewCycle};
    use crate::meetings::MeetingService;
    use crate::progress::ProgressTracker;
    use crate::registrations::RegistrationLedger;
    use chrono::{NaiveDate, NaiveTime};
    use db::models::cycle::{PricingMode, Weekday};
    use db::models::instructor_rate::ActivityType;
    use db::models::registration::RegistrationStatus;
    use db::test_utils::{create_instructor, create_student, set_rate, setup_test_db};
    use sea_orm::PaginatorTrait;

    struct Harness {
        db: DatabaseConnection,
        tracker: AttendanceTracker,
        meetings: Vec<db::models::meeting::Model>,
        registration: db::models::registration::Model,
        service: MeetingService,
        operator: Operator,
    }

    async fn harness() -> Harness {
        let db = setup_test_db().await;
        let instructor = create_instructor(&db, "Noa").await;
        set_rate(&db, instructor.id, ActivityType::Frontal, 100.0).await;

        let operator = Operator::new(1, "back office");
        let generator = MeetingGenerator::new(db.clone(), Arc::new(LogAuditRecorder));
        let (cycle, meetings) = generator
            .create_cycle(
                &operator,
                NewCycle {
                    course_name: "Drawing".into(),
                    branch: None,
                    instructor_id: instructor.id,
                    pricing_mode: PricingMode::Fixed,
                    price_per_student: 0.0,
                    fixed_meeting_revenue: 300.0,
                    vat_inclusive: false,
                    weekday: Weekday::Thursday,
                    start_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
                    end_time: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
                    start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                    end_date: None,
                    total_meetings: 2,
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
        let registration = ledger
            .enroll(&operator, student.id, cycle.id, 200.0, RegistrationStatus::Active)
            .await
            .unwrap();

        let service = MeetingService::new(
            db.clone(),
            ProgressTracker::new(db.clone()),
            Arc::new(LogAuditRecorder),
            Arc::new(LogDispatcher),
        );
        let tracker = AttendanceTracker::new(db.clone(), Arc::new(LogAuditRecorder));

        Harness {
            db,
            tracker,
            meetings,
            registration,
            service,
            operator,
        }
    }

    #[tokio::test]
    async fn second_recording_overwrites_first() {
        let h = harness().await;
        let meeting = h
            .service
            .transition(
                &h.operator,
                h.meetings[0].id,
                db::models::meeting::MeetingStatus::Completed,
            )
            .await
            .unwrap();

        h.tracker
            .record(
                &h.operator,
                meeting.id,
                AttendanceTarget::Registration(h.registration.id),
                AttendanceStatus::Late,
                false,
            )
            .await
            .unwrap();
        let second = h
            .tracker
            .record(
                &h.operator,
                meeting.id,
                AttendanceTarget::Registration(h.registration.id),
                AttendanceStatus::Absent,
                false,
            )
            .await
            .unwrap();
        assert_eq!(second.status, AttendanceStatus::Absent);

        let count = attendance_record::Entity::find()
            .filter(attendance_record::Column::MeetingId.eq(meeting.id))
            .filter(attendance_record::Column::StudentId.eq(h.registration.student_id))
            .count(&h.db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn recording_before_completion_is_rejected() {
        let h = harness().await;
        let err = h
            .tracker
            .record(
                &h.operator,
                h.meetings[0].id,
                AttendanceTarget::Registration(h.registration.id),
                AttendanceStatus::Present,
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn trial_seed_allows_pre_completion_record() {
        let h = harness().await;
        let guest = create_student(&h.db, "Guest").await;

        let record = h
            .tracker
            .record(
                &h.operator,
                h.meetings[0].id,
                AttendanceTarget::Student(guest.id),
                AttendanceStatus::Present,
                true,
            )
            .await
            .unwrap();
        assert_eq!(record.registration_id, None);
        assert_eq!(record.student_id, guest.id);

        // The flag does not bypass the completion rule for enrolled targets.
        let err = h
            .tracker
            .record(
                &h.operator,
                h.meetings[0].id,
                AttendanceTarget::Registration(h.registration.id),
                AttendanceStatus::Present,
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn registration_must_match_meeting_cycle() {
        let h = harness().await;
        h.service
            .transition(
                &h.operator,
                h.meetings[0].id,
                db::models::meeting::MeetingStatus::Completed,
            )
            .await
            .unwrap();

        // Build a second cycle with its own registration.
        let other_instructor = create_instructor(&h.db, "Amit").await;
        set_rate(&h.db, other_instructor.id, ActivityType::Frontal, 90.0).await;
        let generator = MeetingGenerator::new(h.db.clone(), Arc::new(LogAuditRecorder));
        let (other_cycle, _) = generator
            .create_cycle(
                &h.operator,
                NewCycle {
                    course_name: "Piano".into(),
                    branch: None,
                    instructor_id: other_instructor.id,
                    pricing_mode: PricingMode::Fixed,
                    price_per_student: 0.0,
                    fixed_meeting_revenue: 300.0,
                    vat_inclusive: false,
                    weekday: Weekday::Friday,
                    start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                    end_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                    start_date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
                    end_date: None,
                    total_meetings: 2,
                    activity_type: ActivityType::Frontal,
                },
            )
            .await
            .unwrap();
        let stranger = create_student(&h.db, "Lior").await;
        let ledger = RegistrationLedger::new(
            h.db.clone(),
            Arc::new(LogAuditRecorder),
            Arc::new(LogDispatcher),
        );
        let foreign_reg = ledger
            .enroll(&h.operator, stranger.id, other_cycle.id, 100.0, RegistrationStatus::Active)
            .await
            .unwrap();

        let err = h
            .tracker
            .record(
                &h.operator,
                h.meetings[0].id,
                AttendanceTarget::Registration(foreign_reg.id),
                AttendanceStatus::Present,
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
