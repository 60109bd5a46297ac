//! Initial migration to create the gridlog database schema.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_session(manager).await?;
        self.create_record_history(manager).await?;
        self.create_sync_targets(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncTargets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RecordHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SessionTable::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_session(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SessionTable::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SessionTable::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SessionTable::CookieJson).text().not_null())
                    .col(
                        ColumnDef::new(SessionTable::Valid)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(SessionTable::UsedOtp)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(SessionTable::ValidatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SessionTable::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_record_history(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RecordHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RecordHistory::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RecordHistory::BaseId).string().not_null())
                    .col(ColumnDef::new(RecordHistory::TableId).string().not_null())
                    .col(
                        ColumnDef::new(RecordHistory::RecordId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(RecordHistory::Events)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(
                        ColumnDef::new(RecordHistory::EventCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RecordHistory::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_record_history_base_table")
                    .table(RecordHistory::Table)
                    .col(RecordHistory::BaseId)
                    .col(RecordHistory::TableId)
                    .to_owned(),
            )
            .await
    }

    async fn create_sync_targets(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncTargets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncTargets::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncTargets::BaseId).string().not_null())
                    .col(ColumnDef::new(SyncTargets::TableId).string().not_null())
                    .col(
                        ColumnDef::new(SyncTargets::RecordId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(SyncTargets::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum SessionTable {
    #[sea_orm(iden = "session")]
    Table,
    Id,
    CookieJson,
    Valid,
    UsedOtp,
    ValidatedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum RecordHistory {
    Table,
    Id,
    BaseId,
    TableId,
    RecordId,
    Events,
    EventCount,
    SyncedAt,
}

#[derive(DeriveIden)]
enum SyncTargets {
    Table,
    Id,
    BaseId,
    TableId,
    RecordId,
    CreatedAt,
}
