//! Expansion of a cycle definition into its meeting ledger.
//!
//! The cycle row and the full meeting batch persist in a single transaction;
//! a failure midway leaves nothing behind.

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use db::models::cycle::{CycleStatus, Weekday};
use db::models::instructor_rate::ActivityType;
use db::models::meeting::MeetingStatus;
use db::models::{cycle, instructor, meeting};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use tracing::info;

use crate::audit::{snapshot, AuditRecorder, Operator};
use crate::error::{ServiceError, ServiceResult};
use crate::finance;

/// Operator-supplied cycle definition.
#[derive(Debug, Clone)]
pub struct NewCycle {
    pub course_name: String,
    pub branch: Option<String>,
    pub instructor_id: i64,
    pub pricing_mode: cycle::PricingMode,
    pub price_per_student: f64,
    pub fixed_meeting_revenue: f64,
    pub vat_inclusive: bool,
    pub weekday: Weekday,
    pub start_time: chrono::NaiveTime,
    pub end_time: chrono::NaiveTime,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub total_meetings: i32,
    pub activity_type: ActivityType,
}

/// Dates of the first `target` occurrences of `weekday`, starting at
/// `start_date` inclusive and never past `end_date`.
pub fn expand_schedule(
    weekday: Weekday,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    target: i32,
) -> Vec<NaiveDate> {
    let wanted = weekday.to_chrono();
    let mut date = start_date;
    while date.weekday() != wanted {
        date += Duration::days(1);
    }

    let mut dates = Vec::new();
    while dates.len() < target.max(0) as usize {
        if let Some(end) = end_date {
            if date > end {
                break;
            }
        }
        dates.push(date);
        date += Duration::days(7);
    }
    dates
}

pub struct MeetingGenerator {
    db: DatabaseConnection,
    audit: Arc<dyn AuditRecorder>,
}

impl MeetingGenerator {
    pub fn new(db: DatabaseConnection, audit: Arc<dyn AuditRecorder>) -> Self {
        Self { db, audit }
    }

    /// Create a cycle together with its full meeting ledger.
    ///
    /// When the date range runs out before `total_meetings` occurrences, the
    /// cycle's `total_meetings` is clamped to the count actually generated.
    pub async fn create_cycle(
        &self,
        operator: &Operator,
        input: NewCycle,
    ) -> ServiceResult<(cycle::Model, Vec<meeting::Model>)> {
        if let Some(end) = input.end_date {
            if input.start_date > end {
                return Err(ServiceError::Validation(
                    "cycle start date is after its end date".into(),
                ));
            }
        }
        if input.start_time >= input.end_time {
            return Err(ServiceError::Validation(
                "cycle start time must be before its end time".into(),
            ));
        }
        if !input.activity_type.is_schedulable() {
            return Err(ServiceError::Validation(format!(
                "{} is not a valid cycle activity type",
                input.activity_type
            )));
        }

        if instructor::Entity::find_by_id(input.instructor_id)
            .one(&self.db)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound(format!(
                "instructor {} not found",
                input.instructor_id
            )));
        }

        let dates = expand_schedule(
            input.weekday,
            input.start_date,
            input.end_date,
            input.total_meetings,
        );
        if dates.is_empty() {
            return Err(ServiceError::Validation(
                "recurrence produces no meetings inside the date range".into(),
            ));
        }

        let duration_minutes = (input.end_time - input.start_time).num_minutes();
        let rate = finance::hourly_rate(&self.db, input.instructor_id, input.activity_type).await?;
        let instructor_payment = finance::instructor_payment(rate, duration_minutes);

        let txn = self.db.begin().await?;

        let now = Utc::now();
        let cycle = cycle::ActiveModel {
            course_name: Set(input.course_name.clone()),
            branch: Set(input.branch.clone()),
            instructor_id: Set(input.instructor_id),
            pricing_mode: Set(input.pricing_mode),
            price_per_student: Set(input.price_per_student),
            fixed_meeting_revenue: Set(input.fixed_meeting_revenue),
            vat_inclusive: Set(input.vat_inclusive),
            weekday: Set(input.weekday),
            start_time: Set(input.start_time),
            end_time: Set(input.end_time),
            start_date: Set(input.start_date),
            end_date: Set(input.end_date),
            total_meetings: Set(dates.len() as i32),
            completed_meetings: Set(0),
            status: Set(CycleStatus::Active),
            activity_type: Set(input.activity_type),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let revenue = finance::revenue(&txn, &cycle).await?;
        let profit = finance::round2(revenue - instructor_payment);

        let mut meetings = Vec::with_capacity(dates.len());
        for date in &dates {
            let meeting = meeting::ActiveModel {
                cycle_id: Set(cycle.id),
                scheduled_date: Set(*date),
                start_time: Set(input.start_time),
                end_time: Set(input.end_time),
                status: Set(MeetingStatus::Scheduled),
                activity_type: Set(input.activity_type),
                instructor_id: Set(input.instructor_id),
                revenue: Set(revenue),
                instructor_payment: Set(instructor_payment),
                profit: Set(profit),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            meetings.push(meeting);
        }

        txn.commit().await?;

        info!(
            cycle_id = cycle.id,
            meetings = meetings.len(),
            course = %cycle.course_name,
            "generated cycle"
        );
        self.audit.record(
            operator,
            "cycle.create",
            "cycle",
            cycle.id,
            None,
            snapshot(&cycle),
        );

        Ok((cycle, meetings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::LogAuditRecorder;
    use chrono::NaiveTime;
    use db::test_utils::{create_instructor, set_rate, setup_test_db};

    fn base_cycle(instructor_id: i64) -> NewCycle {
        NewCycle {
            course_name: "Robotics beginners".into(),
            branch: Some("North".into()),
            instructor_id,
            pricing_mode: cycle::PricingMode::Fixed,
            price_per_student: 0.0,
            fixed_meeting_revenue: 500.0,
            vat_inclusive: true,
            weekday: Weekday::Wednesday,
            start_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
            // 2026-01-07 is a Wednesday.
            start_date: NaiveDate::from_ymd_opt(2026, 1, 7).unwrap(),
            end_date: None,
            total_meetings: 10,
            activity_type: ActivityType::Frontal,
        }
    }

    async fn generator(db: &sea_orm::DatabaseConnection) -> MeetingGenerator {
        MeetingGenerator::new(db.clone(), Arc::new(LogAuditRecorder))
    }

    #[test]
    fn expand_schedule_weekly_cadence() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap();
        let dates = expand_schedule(Weekday::Wednesday, start, None, 10);
        assert_eq!(dates.len(), 10);
        for pair in dates.windows(2) {
            assert_eq!((pair[1] - pair[0]).num_days(), 7);
        }
        assert_eq!(dates[0], start);
    }

    #[test]
    fn expand_schedule_stops_at_range_end() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 1, 28).unwrap();
        let dates = expand_schedule(Weekday::Wednesday, start, Some(end), 10);
        assert_eq!(dates.len(), 4);
    }

    #[tokio::test]
    async fn generates_ten_wednesday_meetings() {
        let db = setup_test_db().await;
        let instructor = create_instructor(&db, "Noa").await;
        set_rate(&db, instructor.id, ActivityType::Frontal, 120.0).await;

        let operator = Operator::new(1, "back office");
        let (cycle, meetings) = generator(&db)
            .await
            .create_cycle(&operator, base_cycle(instructor.id))
            .await
            .unwrap();

        assert_eq!(cycle.total_meetings, 10);
        assert_eq!(cycle.completed_meetings, 0);
        assert_eq!(meetings.len(), 10);
        for meeting in &meetings {
            assert_eq!(meeting.status, MeetingStatus::Scheduled);
            assert_eq!(meeting.scheduled_date.weekday(), chrono::Weekday::Wed);
            // 90 minutes at 120/h.
            assert_eq!(meeting.instructor_payment, 180.0);
            assert_eq!(meeting.revenue, 500.0);
            assert_eq!(meeting.profit, 320.0);
        }
    }

    #[tokio::test]
    async fn clamps_total_to_generated_count() {
        let db = setup_test_db().await;
        let instructor = create_instructor(&db, "Noa").await;
        set_rate(&db, instructor.id, ActivityType::Frontal, 120.0).await;

        let mut input = base_cycle(instructor.id);
        input.end_date = Some(NaiveDate::from_ymd_opt(2026, 1, 28).unwrap());

        let operator = Operator::new(1, "back office");
        let (cycle, meetings) = generator(&db)
            .await
            .create_cycle(&operator, input)
            .await
            .unwrap();

        assert_eq!(meetings.len(), 4);
        assert_eq!(cycle.total_meetings, 4);
    }

    #[tokio::test]
    async fn rejects_inverted_date_range() {
        let db = setup_test_db().await;
        let instructor = create_instructor(&db, "Noa").await;
        set_rate(&db, instructor.id, ActivityType::Frontal, 120.0).await;

        let mut input = base_cycle(instructor.id);
        input.end_date = Some(NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());

        let operator = Operator::new(1, "back office");
        let err = generator(&db)
            .await
            .create_cycle(&operator, input)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_zero_achievable_occurrences() {
        let db = setup_test_db().await;
        let instructor = create_instructor(&db, "Noa").await;
        set_rate(&db, instructor.id, ActivityType::Frontal, 120.0).await;

        let mut input = base_cycle(instructor.id);
        // Thursday through Monday contains no Wednesday.
        input.start_date = NaiveDate::from_ymd_opt(2026, 1, 8).unwrap();
        input.end_date = Some(NaiveDate::from_ymd_opt(2026, 1, 12).unwrap());

        let operator = Operator::new(1, "back office");
        let err = generator(&db)
            .await
            .create_cycle(&operator, input)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn per_student_revenue_is_zero_before_enrollment() {
        let db = setup_test_db().await;
        let instructor = create_instructor(&db, "Noa").await;
        set_rate(&db, instructor.id, ActivityType::Frontal, 120.0).await;

        let mut input = base_cycle(instructor.id);
        input.pricing_mode = cycle::PricingMode::PerStudent;
        input.price_per_student = 80.0;

        let operator = Operator::new(1, "back office");
        let (_, meetings) = generator(&db)
            .await
            .create_cycle(&operator, input)
            .await
            .unwrap();

        assert_eq!(meetings[0].revenue, 0.0);
        assert_eq!(meetings[0].profit, -180.0);
    }
}
