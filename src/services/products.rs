use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::product::{self, ProductStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Catalog listing parameters, already normalized by the handler layer.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub page: u64,
    pub per_page: u64,
    pub sort_by: ProductSort,
    pub ascending: bool,
    /// Case-insensitive substring match on name or code
    pub search: Option<String>,
    pub product_type: Option<String>,
    /// Storefront views see active products only; the back office sees all
    pub active_only: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProductSort {
    #[default]
    CreatedAt,
    Name,
    Price,
}

/// Fields for creating or replacing a catalog row.
#[derive(Debug, Clone)]
pub struct ProductFields {
    pub code: String,
    pub name: String,
    pub product_type: String,
    pub description: String,
    pub unit_price: Decimal,
    pub sale_price: Option<Decimal>,
    pub sale_end_date: Option<DateTime<Utc>>,
    pub main_image_path: Option<String>,
    pub stock: i32,
    pub status: ProductStatus,
}

/// Catalog CRUD and storefront listing.
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
    events: EventSender,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>, events: EventSender) -> Self {
        Self { db, events }
    }

    /// Paginated, sortable, filterable product listing.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        query: ProductQuery,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let mut condition = Condition::all();
        if query.active_only {
            condition = condition.add(product::Column::Status.eq(ProductStatus::Active));
        }
        if let Some(kind) = &query.product_type {
            condition = condition.add(product::Column::ProductType.eq(kind.as_str()));
        }
        if let Some(term) = &query.search {
            let pattern = format!("%{}%", term.trim());
            condition = condition.add(
                Condition::any()
                    .add(product::Column::Name.like(pattern.as_str()))
                    .add(product::Column::Code.like(pattern.as_str())),
            );
        }

        let mut select = product::Entity::find().filter(condition);
        select = match (query.sort_by, query.ascending) {
            (ProductSort::Name, true) => select.order_by_asc(product::Column::Name),
            (ProductSort::Name, false) => select.order_by_desc(product::Column::Name),
            (ProductSort::Price, true) => select.order_by_asc(product::Column::UnitPrice),
            (ProductSort::Price, false) => select.order_by_desc(product::Column::UnitPrice),
            (ProductSort::CreatedAt, true) => select.order_by_asc(product::Column::CreatedAt),
            (ProductSort::CreatedAt, false) => select.order_by_desc(product::Column::CreatedAt),
        };

        let paginator = select.paginate(self.db.as_ref(), query.per_page.max(1));
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(query.page.saturating_sub(1)).await?;
        Ok((products, total))
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {id} not found")))
    }

    /// Creates a catalog row. The SKU code must be unique.
    #[instrument(skip(self, fields), fields(code = %fields.code))]
    pub async fn create_product(
        &self,
        fields: ProductFields,
    ) -> Result<product::Model, ServiceError> {
        self.ensure_code_free(&fields.code, None).await?;
        validate_pricing(&fields)?;

        let now = Utc::now();
        let created = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(fields.code),
            name: Set(fields.name),
            product_type: Set(fields.product_type),
            description: Set(fields.description),
            unit_price: Set(fields.unit_price),
            sale_price: Set(fields.sale_price),
            sale_end_date: Set(fields.sale_end_date),
            main_image_path: Set(fields.main_image_path),
            stock: Set(fields.stock),
            status: Set(fields.status),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await?;

        self.events
            .send_or_log(Event::ProductCreated(created.id))
            .await;
        Ok(created)
    }

    /// Replaces the mutable fields of a catalog row.
    #[instrument(skip(self, fields))]
    pub async fn update_product(
        &self,
        id: Uuid,
        fields: ProductFields,
    ) -> Result<product::Model, ServiceError> {
        let existing = self.get_product(id).await?;
        if existing.code != fields.code {
            self.ensure_code_free(&fields.code, Some(id)).await?;
        }
        validate_pricing(&fields)?;

        let mut active: product::ActiveModel = existing.into();
        active.code = Set(fields.code);
        active.name = Set(fields.name);
        active.product_type = Set(fields.product_type);
        active.description = Set(fields.description);
        active.unit_price = Set(fields.unit_price);
        active.sale_price = Set(fields.sale_price);
        active.sale_end_date = Set(fields.sale_end_date);
        if let Some(path) = fields.main_image_path {
            active.main_image_path = Set(Some(path));
        }
        active.stock = Set(fields.stock);
        active.status = Set(fields.status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db.as_ref()).await?;

        self.events
            .send_or_log(Event::ProductUpdated(updated.id))
            .await;
        Ok(updated)
    }

    /// Deletes a catalog row. Historical orders are unaffected: their item
    /// rows are snapshots, not references into the live catalog.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.get_product(id).await?;
        existing.delete(self.db.as_ref()).await?;
        self.events.send_or_log(Event::ProductDeleted(id)).await;
        Ok(())
    }

    async fn ensure_code_free(&self, code: &str, except: Option<Uuid>) -> Result<(), ServiceError> {
        let mut select = product::Entity::find().filter(product::Column::Code.eq(code));
        if let Some(id) = except {
            select = select.filter(product::Column::Id.ne(id));
        }
        if select.count(self.db.as_ref()).await? > 0 {
            return Err(ServiceError::Conflict(format!(
                "Product code {code} is already in use"
            )));
        }
        Ok(())
    }
}

fn validate_pricing(fields: &ProductFields) -> Result<(), ServiceError> {
    if fields.unit_price <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Unit price must be positive".into(),
        ));
    }
    if let Some(sale) = fields.sale_price {
        if sale <= Decimal::ZERO || sale >= fields.unit_price {
            return Err(ServiceError::ValidationError(
                "Sale price must be positive and below the unit price".into(),
            ));
        }
    }
    if fields.stock < 0 {
        return Err(ServiceError::ValidationError(
            "Stock cannot be negative".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fields() -> ProductFields {
        ProductFields {
            code: "SKU-1".into(),
            name: "Widget".into(),
            product_type: "gadget".into(),
            description: "A widget".into(),
            unit_price: dec!(20),
            sale_price: None,
            sale_end_date: None,
            main_image_path: None,
            stock: 5,
            status: ProductStatus::Active,
        }
    }

    #[test]
    fn pricing_validation_accepts_sane_fields() {
        assert!(validate_pricing(&fields()).is_ok());
    }

    #[test]
    fn sale_price_must_undercut_unit_price() {
        let mut f = fields();
        f.sale_price = Some(dec!(25));
        assert!(validate_pricing(&f).is_err());
        f.sale_price = Some(dec!(15));
        assert!(validate_pricing(&f).is_ok());
    }

    #[test]
    fn negative_stock_and_free_products_are_rejected() {
        let mut f = fields();
        f.stock = -1;
        assert!(validate_pricing(&f).is_err());

        let mut f = fields();
        f.unit_price = Decimal::ZERO;
        assert!(validate_pricing(&f).is_err());
    }
}
