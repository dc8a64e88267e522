use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, serde::Serialize)]
#[sea_orm(table_name = "instructors")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::instructor_rate::Entity")]
    Rates,
    #[sea_orm(has_many = "super::cycle::Entity")]
    Cycles,
    #[sea_orm(has_many = "super::meeting::Entity")]
    Meetings,
}

impl Related<super::instructor_rate::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Rates.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl Related<super::cycle::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cycles.def()
    }
    fn via() -> Option<RelationDef> {
        None
    }
}

impl ActiveModelBehavior for ActiveModel {}
