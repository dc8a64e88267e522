//! Entity for one dated occurrence of a cycle.
//!
//! Meetings are created in a batch when the cycle is generated and are never
//! deleted; cancellation is a status. The financial columns are a snapshot
//! taken whenever activity type, instructor, or times change, so later
//! rate-table edits do not rewrite history.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::instructor_rate::ActivityType;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "meetings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub cycle_id: i64,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: MeetingStatus,
    /// Inherits the cycle default unless overridden per meeting.
    pub activity_type: ActivityType,
    /// Inherits the cycle instructor unless overridden per meeting.
    pub instructor_id: i64,
    pub revenue: f64,
    pub instructor_payment: f64,
    pub profit: f64,
    pub topic: Option<String>,
    pub notes: Option<String>,
    /// Set when a postponed meeting got a concrete replacement.
    pub rescheduled_to_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MeetingStatus {
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "postponed")]
    Postponed,
}

impl MeetingStatus {
    /// Terminal states count toward cycle completion.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MeetingStatus::Completed | MeetingStatus::Cancelled)
    }

    /// Legal transitions of the meeting state machine. Operator overrides go
    /// through `force_status` and bypass this table.
    pub fn can_transition_to(&self, next: MeetingStatus) -> bool {
        use MeetingStatus::*;
        matches!(
            (*self, next),
            (Scheduled, Completed)
                | (Scheduled, Cancelled)
                | (Scheduled, Postponed)
                | (Postponed, Scheduled)
                | (Postponed, Cancelled)
        )
    }
}

impl Model {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::cycle::Entity",
        from = "Column::CycleId",
        to = "super::cycle::Column::Id"
    )]
    Cycle,
    #[sea_orm(
        belongs_to = "super::instructor::Entity",
        from = "Column::InstructorId",
        to = "super::instructor::Column::Id"
    )]
    Instructor,
    #[sea_orm(has_many = "super::attendance_record::Entity")]
    AttendanceRecords,
}

impl Related<super::cycle::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cycle.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl Related<super::instructor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Instructor.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl Related<super::attendance_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AttendanceRecords.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}
