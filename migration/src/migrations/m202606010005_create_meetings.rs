use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202606010005_create_meetings"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("meetings"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("id")).big_integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Alias::new("cycle_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("scheduled_date")).date().not_null())
                    .col(ColumnDef::new(Alias::new("start_time")).time().not_null())
                    .col(ColumnDef::new(Alias::new("end_time")).time().not_null())
                    .col(ColumnDef::new(Alias::new("status")).text().not_null().default("scheduled"))
                    .col(ColumnDef::new(Alias::new("activity_type")).text().not_null())
                    .col(ColumnDef::new(Alias::new("instructor_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("revenue")).double().not_null().default(0.0))
                    .col(ColumnDef::new(Alias::new("instructor_payment")).double().not_null().default(0.0))
                    .col(ColumnDef::new(Alias::new("profit")).double().not_null().default(0.0))
                    .col(ColumnDef::new(Alias::new("topic")).string().null())
                    .col(ColumnDef::new(Alias::new("notes")).string().null())
                    .col(ColumnDef::new(Alias::new("rescheduled_to_id")).big_integer().null())
                    .col(ColumnDef::new(Alias::new("created_at")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(Alias::new("updated_at")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .foreign_key(
                        ForeignKey::create()
                            .from(Alias::new("meetings"), Alias::new("cycle_id"))
                            .to(Alias::new("cycles"), Alias::new("id")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Alias::new("meetings"), Alias::new("instructor_id"))
                            .to(Alias::new("instructors"), Alias::new("id")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_meetings_cycle_date")
                    .table(Alias::new("meetings"))
                    .col(Alias::new("cycle_id"))
                    .col(Alias::new("scheduled_date"))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("meetings")).to_owned())
            .await
    }
}
