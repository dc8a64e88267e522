//! Per-instructor hourly rates, one row per activity type.
//!
//! Rates are looked up at computation time and snapshotted into
//! `meetings.instructor_payment`; editing a rate never rewrites meetings that
//! were already stamped.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ColumnTrait, ConnectionTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "instructor_rates")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub instructor_id: i64,
    pub activity_type: ActivityType,
    pub hourly_rate: f64,
    pub updated_at: DateTime<Utc>,
}

/// Delivery mode of a meeting. `Preparation` is a paid instructor activity
/// that only exists in the rate table and is never a valid meeting type.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ActivityType {
    #[sea_orm(string_value = "frontal")]
    Frontal,
    #[sea_orm(string_value = "online")]
    Online,
    #[sea_orm(string_value = "private_lesson")]
    PrivateLesson,
    #[sea_orm(string_value = "preparation")]
    Preparation,
}

impl ActivityType {
    /// Whether this activity type is valid for a cycle or meeting (as opposed
    /// to a rate-table-only entry).
    pub fn is_schedulable(&self) -> bool {
        !matches!(self, ActivityType::Preparation)
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
}

impl Related<super::instructor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Instructor.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Entity {
    /// Raw rate-table lookup for one (instructor, activity type) row.
    /// Fallback rules live in the financial calculator, not here.
    pub async fn hourly_rate<C: ConnectionTrait>(
        db: &C,
        instructor_id: i64,
        activity_type: ActivityType,
    ) -> Result<Option<f64>, DbErr> {
        Ok(Entity::find()
            .filter(Column::InstructorId.eq(instructor_id))
            .filter(Column::ActivityType.eq(activity_type))
            .one(db)
            .await?
            .map(|row| row.hourly_rate))
    }
}
