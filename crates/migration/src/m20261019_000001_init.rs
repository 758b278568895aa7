//! Initial schema.
//!
//! - `accounts`: registered users, unique by email
//! - `wallets`: one balance per account, in minor units
//! - `pins`: PIN hash per account
//! - `transfer_tokens`: single-use transfer capabilities
//! - `funding_references`: gateway references already credited
//! - `authorization_codes`: reusable gateway authorizations by email

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Accounts {
    Table,
    Id,
    Email,
    DisplayName,
    PasswordHash,
    CreatedAt,
}

#[derive(Iden)]
enum Wallets {
    Table,
    Id,
    AccountId,
    BalanceMinor,
    UpdatedAt,
}

#[derive(Iden)]
enum Pins {
    Table,
    AccountId,
    PinHash,
    UpdatedAt,
}

#[derive(Iden)]
enum TransferTokens {
    Table,
    Token,
    Status,
    SenderId,
    ReceiverId,
    AmountMinor,
    CreatedAt,
    BoundAt,
    RedeemedAt,
}

#[derive(Iden)]
enum FundingReferences {
    Table,
    Reference,
    AccountId,
    AmountMinor,
    CreatedAt,
}

#[derive(Iden)]
enum AuthorizationCodes {
    Table,
    Email,
    Code,
    UpdatedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Accounts
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Accounts::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Accounts::Email)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Accounts::DisplayName).string().not_null())
                    .col(ColumnDef::new(Accounts::PasswordHash).string().not_null())
                    .col(
                        ColumnDef::new(Accounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Wallets
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Wallets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Wallets::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Wallets::AccountId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Wallets::BalanceMinor)
                            .big_integer()
                            .not_null()
                            .default(0)
                            .check(Expr::col(Wallets::BalanceMinor).gte(0)),
                    )
                    .col(
                        ColumnDef::new(Wallets::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-wallets-account_id")
                            .from(Wallets::Table, Wallets::AccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Pins
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Pins::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Pins::AccountId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Pins::PinHash).string().not_null())
                    .col(
                        ColumnDef::new(Pins::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-pins-account_id")
                            .from(Pins::Table, Pins::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Transfer tokens
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(TransferTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TransferTokens::Token)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TransferTokens::Status)
                            .string()
                            .not_null()
                            .default("open"),
                    )
                    .col(ColumnDef::new(TransferTokens::SenderId).string().not_null())
                    .col(ColumnDef::new(TransferTokens::ReceiverId).string())
                    .col(ColumnDef::new(TransferTokens::AmountMinor).big_integer())
                    .col(
                        ColumnDef::new(TransferTokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TransferTokens::BoundAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(TransferTokens::RedeemedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transfer_tokens-sender_id")
                            .from(TransferTokens::Table, TransferTokens::SenderId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transfer_tokens-receiver_id")
                            .from(TransferTokens::Table, TransferTokens::ReceiverId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transfer_tokens-sender_id")
                    .table(TransferTokens::Table)
                    .col(TransferTokens::SenderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transfer_tokens-receiver_id")
                    .table(TransferTokens::Table)
                    .col(TransferTokens::ReceiverId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Funding references
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(FundingReferences::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FundingReferences::Reference)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FundingReferences::AccountId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FundingReferences::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FundingReferences::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-funding_references-account_id")
                            .from(FundingReferences::Table, FundingReferences::AccountId)
                            .to(Accounts::Table, Accounts::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-funding_references-account_id")
                    .table(FundingReferences::Table)
                    .col(FundingReferences::AccountId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 6. Authorization codes
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(AuthorizationCodes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthorizationCodes::Email)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AuthorizationCodes::Code).string().not_null())
                    .col(
                        ColumnDef::new(AuthorizationCodes::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop in reverse order of creation (respecting FK dependencies)
        manager
            .drop_table(Table::drop().table(AuthorizationCodes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FundingReferences::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TransferTokens::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Pins::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Wallets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts::Table).to_owned())
            .await?;
        Ok(())
    }
}
