//! Meeting status state machine and per-meeting mutations.
//!
//! Every status entry synchronously rebuilds the parent cycle's counters
//! before returning, so callers never observe a stale counter. Entering
//! `completed` seeds one `present` attendance record per active registration
//! when the meeting has none yet.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use db::models::attendance_record::AttendanceStatus;
use db::models::cycle::CycleStatus;
use db::models::instructor_rate::ActivityType;
use db::models::meeting::MeetingStatus;
use db::models::registration::RegistrationStatus;
use db::models::{attendance_record, cycle, instructor, meeting, registration};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use tracing::{info, warn};

use crate::audit::{snapshot, AuditRecorder, Operator};
use crate::error::{ServiceError, ServiceResult};
use crate::events::{LedgerEvent, NotificationDispatcher};
use crate::finance;
use crate::progress::ProgressTracker;

/// Sparse per-meeting update; unset fields keep their prior value.
#[derive(Debug, Clone, Default)]
pub struct MeetingUpdate {
    pub scheduled_date: Option<NaiveDate>,
    pub start_time: Option<chrono::NaiveTime>,
    pub end_time: Option<chrono::NaiveTime>,
    pub activity_type: Option<ActivityType>,
    pub instructor_id: Option<i64>,
    pub topic: Option<String>,
    pub notes: Option<String>,
}

impl MeetingUpdate {
    pub fn is_empty(&self) -> bool {
        self.scheduled_date.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.activity_type.is_none()
            && self.instructor_id.is_none()
            && self.topic.is_none()
            && self.notes.is_none()
    }

    /// Whether the change set touches the cost basis of the meeting.
    fn touches_financials(&self) -> bool {
        self.start_time.is_some()
            || self.end_time.is_some()
            || self.activity_type.is_some()
            || self.instructor_id.is_some()
    }
}

#[derive(Clone)]
pub struct MeetingService {
    db: DatabaseConnection,
    progress: ProgressTracker,
    audit: Arc<dyn AuditRecorder>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl MeetingService {
    pub fn new(
        db: DatabaseConnection,
        progress: ProgressTracker,
        audit: Arc<dyn AuditRecorder>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            db,
            progress,
            audit,
            notifier,
        }
    }

    async fn load(&self, meeting_id: i64) -> ServiceResult<meeting::Model> {
        meeting::Entity::find_by_id(meeting_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("meeting {} not found", meeting_id)))
    }

    /// Move the meeting along the state machine.
    ///
    /// Legal transitions: `scheduled -> completed | cancelled | postponed`,
    /// `postponed -> scheduled | cancelled`. Everything else is rejected;
    /// operator corrections go through [`force_status`](Self::force_status).
    pub async fn transition(
        &self,
        operator: &Operator,
        meeting_id: i64,
        next: MeetingStatus,
    ) -> ServiceResult<meeting::Model> {
        let current = self.load(meeting_id).await?;
        if !current.status.can_transition_to(next) {
            return Err(ServiceError::InvalidState(format!(
                "meeting {} cannot go from {} to {}",
                meeting_id, current.status, next
            )));
        }
        self.apply_status(operator, current, next, "meeting.transition")
            .await
    }

    /// Direct status set, bypassing the transition table but not the
    /// bookkeeping (attendance seeding, counter rebuild, audit).
    ///
    /// This is the operator-correction path, e.g. turning a `cancelled`
    /// meeting back into `completed`. Attendance previously seeded for a
    /// completed meeting is never reversed here; cleaning it up is an explicit
    /// operator responsibility.
    pub async fn force_status(
        &self,
        operator: &Operator,
        meeting_id: i64,
        status: MeetingStatus,
    ) -> ServiceResult<meeting::Model> {
        let current = self.load(meeting_id).await?;
        if current.status == status {
            return Ok(current);
        }
        warn!(
            meeting_id,
            from = %current.status,
            to = %status,
            operator = operator.id,
            "forced meeting status outside the state machine"
        );
        self.apply_status(operator, current, status, "meeting.force_status")
            .await
    }

    async fn apply_status(
        &self,
        operator: &Operator,
        current: meeting::Model,
        next: MeetingStatus,
        action: &str,
    ) -> ServiceResult<meeting::Model> {
        let before = snapshot(&current);

        // Status write and attendance seeding are one transaction: a failure
        // mid-seeding must not leave a completed meeting behind.
        let txn = self.db.begin().await?;
        let mut active: meeting::ActiveModel = current.clone().into();
        active.status = Set(next);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        if next == MeetingStatus::Completed {
            self.seed_attendance(&txn, &updated).await?;
        }
        txn.commit().await?;

        // Callers must never observe a stale counter.
        self.progress.rebuild(updated.cycle_id).await?;

        self.audit.record(
            operator,
            action,
            "meeting",
            updated.id,
            before,
            snapshot(&updated),
        );
        match next {
            MeetingStatus::Completed => self.notifier.notify(LedgerEvent::MeetingCompleted {
                meeting_id: updated.id,
                cycle_id: updated.cycle_id,
                scheduled_date: updated.scheduled_date,
            }),
            MeetingStatus::Cancelled => self.notifier.notify(LedgerEvent::MeetingCancelled {
                meeting_id: updated.id,
                cycle_id: updated.cycle_id,
                scheduled_date: updated.scheduled_date,
            }),
            _ => {}
        }

        Ok(updated)
    }

    /// Re-date a postponed meeting back onto the calendar.
    pub async fn reschedule(
        &self,
        operator: &Operator,
        meeting_id: i64,
        new_date: NaiveDate,
    ) -> ServiceResult<meeting::Model> {
        let current = self.load(meeting_id).await?;
        if !current.status.can_transition_to(MeetingStatus::Scheduled) {
            return Err(ServiceError::InvalidState(format!(
                "meeting {} is {} and cannot be rescheduled",
                meeting_id, current.status
            )));
        }
        let before = snapshot(&current);

        let mut active: meeting::ActiveModel = current.into();
        active.scheduled_date = Set(new_date);
        active.status = Set(MeetingStatus::Scheduled);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&self.db).await?;

        self.progress.rebuild(updated.cycle_id).await?;
        self.audit.record(
            operator,
            "meeting.reschedule",
            "meeting",
            updated.id,
            before,
            snapshot(&updated),
        );
        Ok(updated)
    }

    /// Postpone a meeting and create its replacement on `new_date`.
    ///
    /// The replacement is a fresh occurrence: it is stamped from the current
    /// rate table and enrollment, and the cycle's `total_meetings` grows by
    /// one because the postponed original still counts toward the total.
    pub async fn postpone_to(
        &self,
        operator: &Operator,
        meeting_id: i64,
        new_date: NaiveDate,
    ) -> ServiceResult<(meeting::Model, meeting::Model)> {
        let current = self.load(meeting_id).await?;
        if !current.status.can_transition_to(MeetingStatus::Postponed) {
            return Err(ServiceError::InvalidState(format!(
                "meeting {} is {} and cannot be postponed",
                meeting_id, current.status
            )));
        }
        let parent = cycle::Entity::find_by_id(current.cycle_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("cycle {} not found", current.cycle_id))
            })?;

        let before = snapshot(&current);
        let duration = current.duration_minutes();
        let financials = finance::compute(
            &self.db,
            &parent,
            current.instructor_id,
            current.activity_type,
            duration,
        )
        .await?;

        let txn = self.db.begin().await?;
        let now = Utc::now();

        let replacement = meeting::ActiveModel {
            cycle_id: Set(current.cycle_id),
            scheduled_date: Set(new_date),
            start_time: Set(current.start_time),
            end_time: Set(current.end_time),
            status: Set(MeetingStatus::Scheduled),
            activity_type: Set(current.activity_type),
            instructor_id: Set(current.instructor_id),
            revenue: Set(financials.revenue),
            instructor_payment: Set(financials.instructor_payment),
            profit: Set(financials.profit),
            topic: Set(current.topic.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let mut postponed: meeting::ActiveModel = current.into();
        postponed.status = Set(MeetingStatus::Postponed);
        postponed.rescheduled_to_id = Set(Some(replacement.id));
        postponed.updated_at = Set(now);
        let postponed = postponed.update(&txn).await?;

        let mut parent_active: cycle::ActiveModel = parent.clone().into();
        parent_active.total_meetings = Set(parent.total_meetings + 1);
        parent_active.updated_at = Set(now);
        parent_active.update(&txn).await?;

        txn.commit().await?;

        self.progress.rebuild(postponed.cycle_id).await?;
        self.audit.record(
            operator,
            "meeting.postpone",
            "meeting",
            postponed.id,
            before,
            snapshot(&postponed),
        );
        info!(
            meeting_id = postponed.id,
            replacement_id = replacement.id,
            "postponed meeting to {}",
            new_date
        );

        Ok((postponed, replacement))
    }

    /// Partial field update. Changing activity type, instructor, or times
    /// re-invokes the financial calculator even when the status is unchanged;
    /// revenue keeps its snapshot.
    pub async fn update_meeting(
        &self,
        operator: &Operator,
        meeting_id: i64,
        update: MeetingUpdate,
    ) -> ServiceResult<meeting::Model> {
        if update.is_empty() {
            return Err(ServiceError::Validation(
                "meeting update contains no fields".into(),
            ));
        }
        let current = self.load(meeting_id).await?;
        let before = snapshot(&current);

        if let Some(activity) = update.activity_type {
            if !activity.is_schedulable() {
                return Err(ServiceError::Validation(format!(
                    "{} is not a valid meeting activity type",
                    activity
                )));
            }
        }
        if let Some(instructor_id) = update.instructor_id {
            if instructor::Entity::find_by_id(instructor_id)
                .one(&self.db)
                .await?
                .is_none()
            {
                return Err(ServiceError::NotFound(format!(
                    "instructor {} not found",
                    instructor_id
                )));
            }
        }

        let start_time = update.start_time.unwrap_or(current.start_time);
        let end_time = update.end_time.unwrap_or(current.end_time);
        if start_time >= end_time {
            return Err(ServiceError::Validation(
                "meeting start time must be before its end time".into(),
            ));
        }

        let instructor_id = update.instructor_id.unwrap_or(current.instructor_id);
        let activity_type = update.activity_type.unwrap_or(current.activity_type);
        let touches_financials = update.touches_financials();

        let mut active: meeting::ActiveModel = current.clone().into();
        if let Some(date) = update.scheduled_date {
            active.scheduled_date = Set(date);
        }
        active.start_time = Set(start_time);
        active.end_time = Set(end_time);
        active.activity_type = Set(activity_type);
        active.instructor_id = Set(instructor_id);
        if let Some(topic) = update.topic {
            active.topic = Set(Some(topic));
        }
        if let Some(notes) = update.notes {
            active.notes = Set(Some(notes));
        }

        if touches_financials {
            let duration = (end_time - start_time).num_minutes();
            let financials = finance::recompute_cost(
                &self.db,
                current.revenue,
                instructor_id,
                activity_type,
                duration,
            )
            .await?;
            active.instructor_payment = Set(financials.instructor_payment);
            active.profit = Set(financials.profit);
        }

        active.updated_at = Set(Utc::now());
        let updated = active.update(&self.db).await?;

        self.audit.record(
            operator,
            "meeting.update",
            "meeting",
            updated.id,
            before,
            snapshot(&updated),
        );
        Ok(updated)
    }

    /// Opt-in re-stamp of a historical meeting from the current rate table.
    /// Never invoked implicitly; rate edits do not rewrite history.
    pub async fn recalculate_financials(
        &self,
        operator: &Operator,
        meeting_id: i64,
    ) -> ServiceResult<meeting::Model> {
        let current = self.load(meeting_id).await?;
        let before = snapshot(&current);

        let financials = finance::recompute_cost(
            &self.db,
            current.revenue,
            current.instructor_id,
            current.activity_type,
            current.duration_minutes(),
        )
        .await?;

        let mut active: meeting::ActiveModel = current.into();
        active.instructor_payment = Set(financials.instructor_payment);
        active.profit = Set(financials.profit);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&self.db).await?;

        self.audit.record(
            operator,
            "meeting.recalculate",
            "meeting",
            updated.id,
            before,
            snapshot(&updated),
        );
        Ok(updated)
    }

    /// Operator-driven cycle cancellation. Meetings are kept, not deleted.
    pub async fn cancel_cycle(
        &self,
        operator: &Operator,
        cycle_id: i64,
    ) -> ServiceResult<cycle::Model> {
        let current = cycle::Entity::find_by_id(cycle_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("cycle {} not found", cycle_id)))?;
        if current.status != CycleStatus::Active {
            return Err(ServiceError::InvalidState(format!(
                "cycle {} is already {}",
                cycle_id, current.status
            )));
        }
        let before = snapshot(&current);

        let mut active: cycle::ActiveModel = current.into();
        active.status = Set(CycleStatus::Cancelled);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&self.db).await?;

        self.audit.record(
            operator,
            "cycle.cancel",
            "cycle",
            updated.id,
            before,
            snapshot(&updated),
        );
        Ok(updated)
    }

    /// Default-present seeding when a meeting completes with no attendance
    /// taken yet. Trial/guest attendees are seeded separately by the caller.
    async fn seed_attendance<C: ConnectionTrait>(
        &self,
        db: &C,
        meeting: &meeting::Model,
    ) -> ServiceResult<()> {
        let existing = attendance_record::Entity::find()
            .filter(attendance_record::Column::MeetingId.eq(meeting.id))
            .count(db)
            .await?;
        if existing > 0 {
            return Ok(());
        }

        let active_registrations = registration::Entity::find()
            .filter(registration::Column::CycleId.eq(meeting.cycle_id))
            .filter(registration::Column::Status.eq(RegistrationStatus::Active))
            .all(db)
            .await?;

        for reg in active_registrations {
            attendance_record::ActiveModel {
                meeting_id: Set(meeting.id),
                registration_id: Set(Some(reg.id)),
                student_id: Set(reg.student_id),
                status: Set(AttendanceStatus::Present),
                recorded_at: Set(Utc::now()),
                ..Default::default()
            }
            .insert(db)
            .await?;
        }
        Ok(())
    }
}
