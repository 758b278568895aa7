//! Cards on file: masked number and expiry per account.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Accounts {
    Table,
    Id,
}

#[derive(Iden)]
enum Cards {
    Table,
    Id,
    AccountId,
    MaskedNumber,
    ExpiryMonth,
    ExpiryYear,
    CreatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Cards::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Cards::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Cards::AccountId).string().not_null())
                    .col(ColumnDef::new(Cards::MaskedNumber).string().not_null())
                    .col(
                        ColumnDef::new(Cards::ExpiryMonth)
                            .integer()
                            .not_null()
                            .check(Expr::col(Cards::ExpiryMonth).between(1, 12)),
                    )
                    .col(ColumnDef::new(Cards::ExpiryYear).integer().not_null())
                    .col(
                        ColumnDef::new(Cards::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-cards-account_id")
                            .from(Cards::Table, Cards::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-cards-account_id")
                    .table(Cards::Table)
                    .col(Cards::AccountId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Cards::Table).to_owned())
            .await?;
        Ok(())
    }
}
