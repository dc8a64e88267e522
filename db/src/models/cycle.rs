//! Entity for a recurring class series (a "cycle").
//!
//! A cycle owns its meetings exclusively. Once any meeting exists the cycle is
//! cancelled rather than deleted, so the meeting ledger is never orphaned.
//! `completed_meetings` is a cached counter derived from the ledger; the
//! progress tracker rebuilds it from a fresh read after every status change.

use chrono::{NaiveDate, NaiveTime, Weekday as ChronoWeekday};
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "cycles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub course_name: String,
    pub branch: Option<String>,
    pub instructor_id: i64,
    pub pricing_mode: PricingMode,
    pub price_per_student: f64,
    pub fixed_meeting_revenue: f64,
    pub vat_inclusive: bool,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub total_meetings: i32,
    pub completed_meetings: i32,
    pub status: CycleStatus,
    pub activity_type: super::instructor_rate::ActivityType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PricingMode {
    /// Revenue per meeting = price_per_student x active registrations.
    #[sea_orm(string_value = "per_student")]
    PerStudent,
    /// Revenue per meeting is a fixed number, independent of enrollment.
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CycleStatus {
    #[sea_orm(string_value = "active")]
    Active,
    /// Every generated meeting reached a terminal state.
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Operator-driven; meetings are kept, not deleted.
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Weekday {
    #[sea_orm(string_value = "monday")]
    Monday,
    #[sea_orm(string_value = "tuesday")]
    Tuesday,
    #[sea_orm(string_value = "wednesday")]
    Wednesday,
    #[sea_orm(string_value = "thursday")]
    Thursday,
    #[sea_orm(string_value = "friday")]
    Friday,
    #[sea_orm(string_value = "saturday")]
    Saturday,
    #[sea_orm(string_value = "sunday")]
    Sunday,
}

impl Weekday {
    pub fn to_chrono(self) -> ChronoWeekday {
        match self {
            Weekday::Monday => ChronoWeekday::Mon,
            Weekday::Tuesday => ChronoWeekday::Tue,
            Weekday::Wednesday => ChronoWeekday::Wed,
            Weekday::Thursday => ChronoWeekday::Thu,
            Weekday::Friday => ChronoWeekday::Fri,
            Weekday::Saturday => ChronoWeekday::Sat,
            Weekday::Sunday => ChronoWeekday::Sun,
        }
    }
}

impl Model {
    /// Derived counter; never stored.
    pub fn remaining_meetings(&self) -> i32 {
        self.total_meetings - self.completed_meetings
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::instructor::Entity",
        from = "Column::InstructorId",
        to = "super::instructor::Column::Id"
    )]
    Instructor,
    #[sea_orm(has_many = "super::meeting::Entity")]
    Meetings,
    #[sea_orm(has_many = "super::registration::Entity")]
    Registrations,
}

impl Related<super::instructor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Instructor.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl Related<super::meeting::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Meetings.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl Related<super::registration::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Registrations.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}
