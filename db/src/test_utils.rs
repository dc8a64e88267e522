use chrono::Utc;
use migration::Migrator;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;

use crate::models::instructor_rate::ActivityType;
use crate::models::{instructor, instructor_rate, student};

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory db");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

pub async fn create_instructor(db: &DatabaseConnection, name: &str) -> instructor::Model {
    instructor::ActiveModel {
        name: Set(name.to_owned()),
        email: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert instructor")
}

pub async fn create_student(db: &DatabaseConnection, name: &str) -> student::Model {
    student::ActiveModel {
        name: Set(name.to_owned()),
        email: Set(None),
        created_at: Set(Utc::now()),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert student")
}

pub async fn set_rate(
    db: &DatabaseConnection,
    instructor_id: i64,
    activity_type: ActivityType,
    hourly_rate: f64,
) -> instructor_rate::Model {
    instructor_rate::ActiveModel {
        instructor_id: Set(instructor_id),
        activity_type: Set(activity_type),
        hourly_rate: Set(hourly_rate),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert instructor rate")
}

#[cfg(test)]
mod tests {
    use super::*;

    // Runs the full migration chain, secondary indexes included.
    #[tokio::test]
    async fn schema_applies_on_a_fresh_database() {
        let db = setup_test_db().await;

        let instructor = create_instructor(&db, "Noa").await;
        set_rate(&db, instructor.id, ActivityType::Frontal, 120.0).await;
        let student = create_student(&db, "Dana").await;

        assert!(instructor.id > 0);
        assert!(student.id > 0);
    }
}
