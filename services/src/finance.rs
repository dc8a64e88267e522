//! Financial computation for meetings.
//!
//! Instructor cost is snapshotted into the meeting at computation time:
//! meeting creation, activity-type override, instructor reassignment, or a
//! duration change. Editing the rate table afterwards does not rewrite
//! already-stamped meetings; the only re-stamping path is the opt-in bulk
//! recalculation.

use db::models::instructor_rate::ActivityType;
use db::models::registration::RegistrationStatus;
use db::models::{cycle, registration};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};

use crate::error::{ServiceError, ServiceResult};

/// Computed financial fields of one meeting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeetingFinancials {
    pub revenue: f64,
    pub instructor_payment: f64,
    pub profit: f64,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Hourly rate for an instructor and activity type.
///
/// Fallback chain: a missing `private_lesson` rate falls back to the
/// `frontal` rate. Anything else missing is a hard error, since a meeting
/// cannot be stamped without a cost basis.
pub async fn hourly_rate<C: ConnectionTrait>(
    db: &C,
    instructor_id: i64,
    activity_type: ActivityType,
) -> ServiceResult<f64> {
    if let Some(rate) =
        db::models::InstructorRate::hourly_rate(db, instructor_id, activity_type).await?
    {
        return Ok(rate);
    }

    if activity_type == ActivityType::PrivateLesson {
        if let Some(rate) =
            db::models::InstructorRate::hourly_rate(db, instructor_id, ActivityType::Frontal)
                .await?
        {
            return Ok(rate);
        }
    }

    Err(ServiceError::NotFound(format!(
        "no {} rate for instructor {}",
        activity_type, instructor_id
    )))
}

/// Instructor cost for one meeting: hourly rate x duration, rounded to cents.
pub fn instructor_payment(hourly_rate: f64, duration_minutes: i64) -> f64 {
    round2(hourly_rate * duration_minutes as f64 / 60.0)
}

/// Revenue for one meeting of the given cycle, evaluated at computation time.
///
/// `per_student` pricing counts currently-active registrations; later
/// enrollments do not retroactively change meetings that were already stamped.
pub async fn revenue<C: ConnectionTrait>(db: &C, cycle: &cycle::Model) -> ServiceResult<f64> {
    match cycle.pricing_mode {
        cycle::PricingMode::Fixed => Ok(round2(cycle.fixed_meeting_revenue)),
        cycle::PricingMode::PerStudent => {
            let active = registration::Entity::find()
                .filter(registration::Column::CycleId.eq(cycle.id))
                .filter(registration::Column::Status.eq(RegistrationStatus::Active))
                .count(db)
                .await?;
            Ok(round2(cycle.price_per_student * active as f64))
        }
    }
}

/// Full stamp for a new meeting: revenue from the cycle's pricing mode, cost
/// from the rate table, profit as the difference (may be negative).
pub async fn compute<C: ConnectionTrait>(
    db: &C,
    cycle: &cycle::Model,
    instructor_id: i64,
    activity_type: ActivityType,
    duration_minutes: i64,
) -> ServiceResult<MeetingFinancials> {
    let revenue = revenue(db, cycle).await?;
    let rate = hourly_rate(db, instructor_id, activity_type).await?;
    let instructor_payment = instructor_payment(rate, duration_minutes);

    Ok(MeetingFinancials {
        revenue,
        instructor_payment,
        profit: round2(revenue - instructor_payment),
    })
}

/// Cost-only restamp for an existing meeting. Revenue is left untouched: an
/// activity-type or instructor change affects what the instructor is paid,
/// not what the customer was charged.
pub async fn recompute_cost<C: ConnectionTrait>(
    db: &C,
    revenue: f64,
    instructor_id: i64,
    activity_type: ActivityType,
    duration_minutes: i64,
) -> ServiceResult<MeetingFinancials> {
    let rate = hourly_rate(db, instructor_id, activity_type).await?;
    let instructor_payment = instructor_payment(rate, duration_minutes);

    Ok(MeetingFinancials {
        revenue,
        instructor_payment,
        profit: round2(revenue - instructor_payment),
    })
}
