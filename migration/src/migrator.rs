use sea_orm_migration::prelude::*;

use crate::migrations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(migrations::m202606010001_create_instructors::Migration),
            Box::new(migrations::m202606010002_create_students::Migration),
            Box::new(migrations::m202606010003_create_instructor_rates::Migration),
            Box::new(migrations::m202606010004_create_cycles::Migration),
            Box::new(migrations::m202606010005_create_meetings::Migration),
            Box::new(migrations::m202606010006_create_registrations::Migration),
            Box::new(migrations::m202606010007_create_attendance_records::Migration),
        ]
    }
}
