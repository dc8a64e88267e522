use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m202606010006_create_registrations"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("registrations"))
                    .if_not_exists()
                    .col(ColumnDef::new(Alias::new("id")).big_integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Alias::new("cycle_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("student_id")).big_integer().not_null())
                    .col(ColumnDef::new(Alias::new("status")).text().not_null().default("active"))
                    .col(ColumnDef::new(Alias::new("amount_owed")).double().not_null().default(0.0))
                    .col(ColumnDef::new(Alias::new("payment_status")).text().not_null().default("unpaid"))
                    .col(ColumnDef::new(Alias::new("payment_method")).string().null())
                    .col(ColumnDef::new(Alias::new("invoice_link")).string().null())
                    .col(ColumnDef::new(Alias::new("cancelled_at")).timestamp().null())
                    .col(ColumnDef::new(Alias::new("cancellation_reason")).string().null())
                    .col(ColumnDef::new(Alias::new("notes")).string().null())
                    .col(ColumnDef::new(Alias::new("created_at")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .col(ColumnDef::new(Alias::new("updated_at")).timestamp().not_null().default(Expr::cust("CURRENT_TIMESTAMP")))
                    .foreign_key(
                        ForeignKey::create()
                            .from(Alias::new("registrations"), Alias::new("cycle_id"))
                            .to(Alias::new("cycles"), Alias::new("id")),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Alias::new("registrations"), Alias::new("student_id"))
                            .to(Alias::new("students"), Alias::new("id")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_registrations_cycle_student")
                    .table(Alias::new("registrations"))
                    .col(Alias::new("cycle_id"))
                    .col(Alias::new("student_id"))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("registrations")).to_owned())
            .await
    }
}
