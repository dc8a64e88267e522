//! Cached cycle progress counters.
//!
//! `completed_meetings` on the cycle row is a cache over the meeting ledger,
//! never a source of truth. Rebuilding is always a fresh full read of the
//! cycle's meetings; recomputations for the same cycle are serialized through
//! a per-cycle lock so concurrent bulk mutations cannot interleave the
//! read-then-write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use db::models::cycle::CycleStatus;
use db::models::meeting::MeetingStatus;
use db::models::{cycle, meeting};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use tokio::sync::Mutex as CycleLock;
use tracing::debug;

use crate::error::{ServiceError, ServiceResult};

/// Counters derived from one full scan of a cycle's meeting ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleProgress {
    pub total: i32,
    pub completed: i32,
    pub scheduled: i32,
    pub cancelled: i32,
    pub postponed: i32,
}

impl CycleProgress {
    pub fn remaining(&self) -> i32 {
        self.total - self.completed
    }
}

#[derive(Clone)]
pub struct ProgressTracker {
    db: DatabaseConnection,
    locks: Arc<Mutex<HashMap<i64, Arc<CycleLock<()>>>>>,
}

impl ProgressTracker {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn cycle_lock(&self, cycle_id: i64) -> Arc<CycleLock<()>> {
        let mut locks = self.locks.lock().expect("cycle lock registry poisoned");
        // Evict entries no other task holds, so the registry stays bounded by
        // the number of cycles currently being rebuilt.
        locks.retain(|id, lock| *id == cycle_id || Arc::strong_count(lock) > 1);
        locks.entry(cycle_id).or_default().clone()
    }

    /// Recompute the cycle's counters from the ledger and persist them.
    ///
    /// Also the reconciliation entry point: callers may invoke it at any time
    /// to realign the cached counter with the ledger. When every meeting of an
    /// active cycle is terminal, the cycle itself becomes `completed`.
    pub async fn rebuild(&self, cycle_id: i64) -> ServiceResult<CycleProgress> {
        let lock = self.cycle_lock(cycle_id);
        let _guard = lock.lock().await;

        let cycle = cycle::Entity::find_by_id(cycle_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("cycle {} not found", cycle_id)))?;

        let meetings = meeting::Entity::find()
            .filter(meeting::Column::CycleId.eq(cycle_id))
            .all(&self.db)
            .await?;

        let count = |status: MeetingStatus| {
            meetings.iter().filter(|m| m.status == status).count() as i32
        };
        let progress = CycleProgress {
            total: cycle.total_meetings,
            completed: count(MeetingStatus::Completed),
            scheduled: count(MeetingStatus::Scheduled),
            cancelled: count(MeetingStatus::Cancelled),
            postponed: count(MeetingStatus::Postponed),
        };

        let all_terminal =
            !meetings.is_empty() && meetings.iter().all(|m| m.status.is_terminal());

        let mut active: cycle::ActiveModel = cycle.clone().into();
        active.completed_meetings = Set(progress.completed);
        if cycle.status == CycleStatus::Active && all_terminal {
            active.status = Set(CycleStatus::Completed);
        }
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;

        debug!(
            cycle_id,
            completed = progress.completed,
            remaining = progress.remaining(),
            "rebuilt cycle progress"
        );

        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{LogAuditRecorder, Operator};
    use crate::generator::{MeetingGenerator, NewCycle};
    use chrono::{NaiveDate, NaiveTime};
    use db::models::cycle::{PricingMode, Weekday};
    use db::models::instructor_rate::ActivityType;
    use db::test_utils::{create_instructor, set_rate, setup_test_db};

    async fn seeded_cycle(
        db: &DatabaseConnection,
        total: i32,
    ) -> (cycle::Model, Vec<meeting::Model>) {
        let instructor = create_instructor(db, "Noa").await;
        set_rate(db, instructor.id, ActivityType::Frontal, 100.0).await;
        let generator = MeetingGenerator::new(db.clone(), Arc::new(LogAuditRecorder));
        generator
            .create_cycle(
                &Operator::new(1, "back office"),
                NewCycle {
                    course_name: "Chess club".into(),
                    branch: None,
                    instructor_id: instructor.id,
                    pricing_mode: PricingMode::Fixed,
                    price_per_student: 0.0,
                    fixed_meeting_revenue: 300.0,
                    vat_inclusive: false,
                    weekday: Weekday::Monday,
                    start_time: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
                    end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                    start_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                    end_date: None,
                    total_meetings: total,
                    activity_type: ActivityType::Frontal,
                },
            )
            .await
            .unwrap()
    }

    async fn force_meeting_status(
        db: &DatabaseConnection,
        meeting: &meeting::Model,
        status: MeetingStatus,
    ) {
        let mut active: meeting::ActiveModel = meeting.clone().into();
        active.status = Set(status);
        active.update(db).await.unwrap();
    }

    #[tokio::test]
    async fn counters_partition_the_ledger() {
        let db = setup_test_db().await;
        let (cycle, meetings) = seeded_cycle(&db, 4).await;
        let tracker = ProgressTracker::new(db.clone());

        force_meeting_status(&db, &meetings[0], MeetingStatus::Completed).await;
        force_meeting_status(&db, &meetings[1], MeetingStatus::Cancelled).await;
        force_meeting_status(&db, &meetings[2], MeetingStatus::Postponed).await;

        let progress = tracker.rebuild(cycle.id).await.unwrap();
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.cancelled, 1);
        assert_eq!(progress.postponed, 1);
        assert_eq!(progress.scheduled, 1);
        assert_eq!(
            progress.completed + progress.cancelled + progress.postponed + progress.scheduled,
            progress.total
        );
        assert_eq!(progress.remaining(), 3);

        let stored = cycle::Entity::find_by_id(cycle.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.completed_meetings, 1);
        assert_eq!(stored.status, CycleStatus::Active);
    }

    #[tokio::test]
    async fn cycle_completes_when_all_meetings_terminal() {
        let db = setup_test_db().await;
        let (cycle, meetings) = seeded_cycle(&db, 2).await;
        let tracker = ProgressTracker::new(db.clone());

        force_meeting_status(&db, &meetings[0], MeetingStatus::Completed).await;
        force_meeting_status(&db, &meetings[1], MeetingStatus::Cancelled).await;

        let progress = tracker.rebuild(cycle.id).await.unwrap();
        assert_eq!(progress.completed, 1);

        let stored = cycle::Entity::find_by_id(cycle.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, CycleStatus::Completed);
    }

    #[tokio::test]
    async fn rebuild_corrects_a_drifted_counter() {
        let db = setup_test_db().await;
        let (cycle, meetings) = seeded_cycle(&db, 3).await;
        let tracker = ProgressTracker::new(db.clone());

        // Simulate drift in the cached counter.
        let mut active: cycle::ActiveModel = cycle.clone().into();
        active.completed_meetings = Set(99);
        active.update(&db).await.unwrap();

        force_meeting_status(&db, &meetings[0], MeetingStatus::Completed).await;
        let progress = tracker.rebuild(cycle.id).await.unwrap();
        assert_eq!(progress.completed, 1);

        let stored = cycle::Entity::find_by_id(cycle.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.completed_meetings, 1);
    }

    #[tokio::test]
    async fn lock_registry_evicts_idle_cycles() {
        let db = setup_test_db().await;
        let (first, _) = seeded_cycle(&db, 1).await;
        let (second, _) = seeded_cycle(&db, 1).await;
        let tracker = ProgressTracker::new(db.clone());

        tracker.rebuild(first.id).await.unwrap();
        tracker.rebuild(second.id).await.unwrap();

        let registry = tracker.locks.lock().unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains_key(&second.id));
    }

    #[tokio::test]
    async fn unknown_cycle_is_not_found() {
        let db = setup_test_db().await;
        let tracker = ProgressTracker::new(db);
        let err = tracker.rebuild(4242).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
