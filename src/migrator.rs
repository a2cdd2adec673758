//! Programmatic schema migrations.

use sea_orm_migration::prelude::*;

pub struct Migrator;

impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(CreateInitialTables)]
    }
}

#[derive(DeriveMigrationName)]
struct CreateInitialTables;

#[async_trait::async_trait]
impl MigrationTrait for CreateInitialTables {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Products::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Products::Code).string_len(50).not_null().unique_key())
                    .col(ColumnDef::new(Products::Name).string_len(200).not_null())
                    .col(ColumnDef::new(Products::ProductType).string_len(100).not_null())
                    .col(ColumnDef::new(Products::Description).text().not_null())
                    .col(ColumnDef::new(Products::UnitPrice).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(Products::SalePrice).decimal_len(16, 4))
                    .col(ColumnDef::new(Products::SaleEndDate).timestamp_with_time_zone())
                    .col(ColumnDef::new(Products::MainImagePath).string())
                    .col(ColumnDef::new(Products::Stock).integer().not_null().default(0))
                    .col(ColumnDef::new(Products::Status).string_len(20).not_null())
                    .col(ColumnDef::new(Products::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Products::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Users::Email).string_len(254).not_null().unique_key())
                    .col(ColumnDef::new(Users::Name).string_len(200).not_null())
                    .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                    .col(ColumnDef::new(Users::Role).string_len(20).not_null())
                    .col(ColumnDef::new(Users::Phone).string_len(30))
                    .col(ColumnDef::new(Users::Address).string_len(500))
                    .col(ColumnDef::new(Users::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Users::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Orders::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Orders::OrderNumber).string_len(20).not_null().unique_key())
                    .col(ColumnDef::new(Orders::UserId).uuid())
                    .col(ColumnDef::new(Orders::Subtotal).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(Orders::Tax).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(Orders::ShippingCost).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(Orders::Discount).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(Orders::TotalAmount).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(Orders::PaymentMethod).string_len(50).not_null())
                    .col(ColumnDef::new(Orders::PaymentStatus).string_len(20).not_null())
                    .col(ColumnDef::new(Orders::OrderStatus).string_len(20).not_null())
                    .col(ColumnDef::new(Orders::ShippingAddress).text())
                    .col(ColumnDef::new(Orders::IsPickUp).boolean().not_null().default(false))
                    .col(ColumnDef::new(Orders::CustomerNote).string())
                    .col(ColumnDef::new(Orders::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Orders::UpdatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_orders_user")
                            .from(Orders::Table, Orders::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_orders_user_id")
                    .table(Orders::Table)
                    .col(Orders::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OrderItems::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(OrderItems::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                    .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                    .col(ColumnDef::new(OrderItems::Name).string_len(200).not_null())
                    .col(ColumnDef::new(OrderItems::Code).string_len(50).not_null())
                    .col(ColumnDef::new(OrderItems::ImagePath).string())
                    .col(ColumnDef::new(OrderItems::UnitPrice).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                    .col(ColumnDef::new(OrderItems::Subtotal).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(OrderItems::CreatedAt).timestamp_with_time_zone().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_items_order")
                            .from(OrderItems::Table, OrderItems::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_order_items_order_id")
                    .table(OrderItems::Table)
                    .col(OrderItems::OrderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OrderStatusHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrderStatusHistory::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OrderStatusHistory::OrderId).uuid().not_null())
                    .col(ColumnDef::new(OrderStatusHistory::Status).string_len(20).not_null())
                    .col(
                        ColumnDef::new(OrderStatusHistory::ChangedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OrderStatusHistory::Note).string())
                    .col(ColumnDef::new(OrderStatusHistory::ChangedBy).uuid())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_status_history_order")
                            .from(OrderStatusHistory::Table, OrderStatusHistory::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_order_status_history_order_id")
                    .table(OrderStatusHistory::Table)
                    .col(OrderStatusHistory::OrderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Issues::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Issues::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Issues::Name).string_len(200).not_null())
                    .col(ColumnDef::new(Issues::Email).string_len(254).not_null())
                    .col(ColumnDef::new(Issues::Subject).string_len(300).not_null())
                    .col(ColumnDef::new(Issues::Message).text().not_null())
                    .col(ColumnDef::new(Issues::Status).string_len(20).not_null())
                    .col(ColumnDef::new(Issues::CreatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Issues::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OrderStatusHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OrderItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Products::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
    Code,
    Name,
    ProductType,
    Description,
    UnitPrice,
    SalePrice,
    SaleEndDate,
    MainImagePath,
    Stock,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    Name,
    PasswordHash,
    Role,
    Phone,
    Address,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Orders {
    Table,
    Id,
    OrderNumber,
    UserId,
    Subtotal,
    Tax,
    ShippingCost,
    Discount,
    TotalAmount,
    PaymentMethod,
    PaymentStatus,
    OrderStatus,
    ShippingAddress,
    IsPickUp,
    CustomerNote,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum OrderItems {
    Table,
    Id,
    OrderId,
    ProductId,
    Name,
    Code,
    ImagePath,
    UnitPrice,
    Quantity,
    Subtotal,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OrderStatusHistory {
    Table,
    Id,
    OrderId,
    Status,
    ChangedAt,
    Note,
    ChangedBy,
}

#[derive(DeriveIden)]
enum Issues {
    Table,
    Id,
    Name,
    Email,
    Subject,
    Message,
    Status,
    CreatedAt,
}
