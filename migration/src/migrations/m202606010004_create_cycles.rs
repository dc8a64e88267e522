use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202606010004_create_cycles"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("cycles"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("id")).big_integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Alias::new("course_name")).string().not_null())
                    .col(ColumnDef::new(Alias::new("branch")).string().null())
                    .col(ColumnDef::new(Alias::new("instructor_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("pricing_mode")).text().not_null())
                    .col(ColumnDef::new(Alias::new("price_per_student")).double().not_null().default(0.0))
                    .col(ColumnDef::new(Alias::new("fixed_meeting_revenue")).double().not_null().default(0.0))
                    .col(ColumnDef::new(Alias::new("vat_inclusive")).boolean().not_null().default(false))
                    .col(ColumnDef::new(Alias::new("weekday")).text().not_null())
                    .col(ColumnDef::new(Alias::new("start_time")).time().not_null())
                    .col(ColumnDef::new(Alias::new("end_time")).time().not_null())
                    .col(ColumnDef::new(Alias::new("start_date")).date().not_null())
                    .col(ColumnDef::new(Alias::new("end_date")).date().null())
                    .col(ColumnDef::new(Alias::new("total_meetings")).integer().not_null())
                    .col(ColumnDef::new(Alias::new("completed_meetings")).integer().not_null().default(0))
                    .col(ColumnDef::new(Alias::new("status")).text().not_null().default("active"))
                    .col(ColumnDef::new(Alias::new("activity_type")).text().not_null())
                    .col(ColumnDef::new(Alias::new("created_at")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(Alias::new("updated_at")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .foreign_key(
                        ForeignKey::create()
                            .from(Alias::new("cycles"), Alias::new("instructor_id"))
                            .to(Alias::new("instructors"), Alias::new("id")),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("cycles")).to_owned())
            .await
    }
}
