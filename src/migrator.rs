use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_products_table::Migration),
            Box::new(m20240301_000002_create_shops_tables::Migration),
            Box::new(m20240301_000003_create_shop_inventories_table::Migration),
            Box::new(m20240301_000004_create_restock_requests_table::Migration),
            Box::new(m20240715_000005_migrate_legacy_request_statuses::Migration),
        ]
    }
}

mod m20240301_000001_create_products_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Products::Sku)
                                .string_len(100)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Description).text())
                        .col(
                            ColumnDef::new(Products::UnitPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::TotalStock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::MinStockLevel).integer())
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Products {
        Table,
        Id,
        Sku,
        Name,
        Description,
        UnitPrice,
        TotalStock,
        MinStockLevel,
        IsActive,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_shops_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_shops_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Shops::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Shops::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Shops::Name).string().not_null())
                        .col(ColumnDef::new(Shops::ManagerId).uuid())
                        .col(
                            ColumnDef::new(Shops::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Shops::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Shops::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ShopAssignments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(ShopAssignments::ShopId).uuid().not_null())
                        .col(ColumnDef::new(ShopAssignments::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(ShopAssignments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .primary_key(
                            Index::create()
                                .col(ShopAssignments::ShopId)
                                .col(ShopAssignments::UserId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_shop_assignments_shop")
                                .from(ShopAssignments::Table, ShopAssignments::ShopId)
                                .to(Shops::Table, Shops::Id),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ShopAssignments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Shops::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum Shops {
        Table,
        Id,
        Name,
        ManagerId,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    pub enum ShopAssignments {
        Table,
        ShopId,
        UserId,
        CreatedAt,
    }
}

mod m20240301_000003_create_shop_inventories_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_shop_inventories_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ShopInventories::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ShopInventories::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ShopInventories::ShopId).uuid().not_null())
                        .col(ColumnDef::new(ShopInventories::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(ShopInventories::CurrentStock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(ShopInventories::MinStockPerItem).integer())
                        .col(
                            ColumnDef::new(ShopInventories::LowStockAlertsEnabled)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(ShopInventories::LastRestockDate)
                                .timestamp_with_time_zone(),
                        )
                        .col(
                            ColumnDef::new(ShopInventories::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(ShopInventories::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ShopInventories::UpdatedAt).timestamp_with_time_zone())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_shop_inventories_shop")
                                .from(ShopInventories::Table, ShopInventories::ShopId)
                                .to(
                                    super::m20240301_000002_create_shops_tables::Shops::Table,
                                    super::m20240301_000002_create_shops_tables::Shops::Id,
                                ),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_shop_inventories_product")
                                .from(ShopInventories::Table, ShopInventories::ProductId)
                                .to(
                                    super::m20240301_000001_create_products_table::Products::Table,
                                    super::m20240301_000001_create_products_table::Products::Id,
                                ),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_shop_inventories_shop_product")
                        .table(ShopInventories::Table)
                        .col(ShopInventories::ShopId)
                        .col(ShopInventories::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ShopInventories::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum ShopInventories {
        Table,
        Id,
        ShopId,
        ProductId,
        CurrentStock,
        MinStockPerItem,
        LowStockAlertsEnabled,
        LastRestockDate,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_restock_requests_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_restock_requests_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(RestockRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RestockRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RestockRequests::ShopId).uuid().not_null())
                        .col(ColumnDef::new(RestockRequests::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(RestockRequests::RequestedAmount)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RestockRequests::RequestType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RestockRequests::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(RestockRequests::Notes).text())
                        .col(
                            ColumnDef::new(RestockRequests::Hidden)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(RestockRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RestockRequests::ApprovedAt).timestamp_with_time_zone())
                        .col(
                            ColumnDef::new(RestockRequests::FulfilledAt).timestamp_with_time_zone(),
                        )
                        .col(ColumnDef::new(RestockRequests::UpdatedAt).timestamp_with_time_zone())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_restock_requests_shop")
                                .from(RestockRequests::Table, RestockRequests::ShopId)
                                .to(
                                    super::m20240301_000002_create_shops_tables::Shops::Table,
                                    super::m20240301_000002_create_shops_tables::Shops::Id,
                                ),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_restock_requests_product")
                                .from(RestockRequests::Table, RestockRequests::ProductId)
                                .to(
                                    super::m20240301_000001_create_products_table::Products::Table,
                                    super::m20240301_000001_create_products_table::Products::Id,
                                ),
                        )
                        .to_owned(),
                )
                .await?;

            // One lookup per (shop, product, status) backs both the duplicate
            // guard and scoped listings.
            manager
                .create_index(
                    Index::create()
                        .name("idx_restock_requests_shop_product_status")
                        .table(RestockRequests::Table)
                        .col(RestockRequests::ShopId)
                        .col(RestockRequests::ProductId)
                        .col(RestockRequests::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_restock_requests_status")
                        .table(RestockRequests::Table)
                        .col(RestockRequests::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RestockRequests::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum RestockRequests {
        Table,
        Id,
        ShopId,
        ProductId,
        RequestedAmount,
        RequestType,
        Status,
        Notes,
        Hidden,
        CreatedAt,
        ApprovedAt,
        FulfilledAt,
        UpdatedAt,
    }
}

mod m20240715_000005_migrate_legacy_request_statuses {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240715_000005_migrate_legacy_request_statuses"
        }
    }

    /// Earlier deployments wrote `pending`/`in_transit` statuses. Those rows
    /// are folded into the current vocabulary so the code only ever sees one.
    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let db = manager.get_connection();
            db.execute_unprepared(
                "UPDATE restock_requests SET status = 'waiting_for_approval' WHERE status = 'pending'",
            )
            .await?;
            db.execute_unprepared(
                "UPDATE restock_requests SET status = 'approved_pending' WHERE status = 'in_transit'",
            )
            .await?;
            Ok(())
        }

        async fn down(&self, _manager: &SchemaManager) -> Result<(), DbErr> {
            // Lossy by nature; the legacy vocabulary is not restored.
            Ok(())
        }
    }
}
