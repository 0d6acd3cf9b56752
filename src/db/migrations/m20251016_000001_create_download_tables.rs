use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MediaItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MediaItems::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MediaItems::RemoteContentId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MediaItems::Title).string().not_null())
                    .col(
                        ColumnDef::new(MediaItems::IsDownloaded)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(MediaItems::DownloadProgress)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(MediaItems::LocalFilePath).string().null())
                    .col(
                        ColumnDef::new(MediaItems::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DownloadJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DownloadJobs::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DownloadJobs::MediaItemId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DownloadJobs::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(DownloadJobs::Progress)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(DownloadJobs::DownloadedBytes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DownloadJobs::TotalBytes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(DownloadJobs::FilePath).string().null())
                    .col(ColumnDef::new(DownloadJobs::LastError).text().null())
                    .col(
                        ColumnDef::new(DownloadJobs::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DownloadJobs::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(DownloadJobs::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_download_jobs_media_item")
                            .from(DownloadJobs::Table, DownloadJobs::MediaItemId)
                            .to(MediaItems::Table, MediaItems::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_download_jobs_status")
                    .table(DownloadJobs::Table)
                    .col(DownloadJobs::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AppCredentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AppCredentials::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AppCredentials::Value).text().not_null())
                    .col(
                        ColumnDef::new(AppCredentials::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AppCredentials::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DownloadJobs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MediaItems::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(Iden)]
enum MediaItems {
    Table,
    Id,
    RemoteContentId,
    Title,
    IsDownloaded,
    DownloadProgress,
    LocalFilePath,
    UpdatedAt,
}

#[derive(Iden)]
enum DownloadJobs {
    Table,
    Id,
    MediaItemId,
    Status,
    Progress,
    DownloadedBytes,
    TotalBytes,
    FilePath,
    LastError,
    AttemptCount,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum AppCredentials {
    Table,
    Key,
    Value,
    UpdatedAt,
}
