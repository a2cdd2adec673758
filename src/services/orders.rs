use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::cart::CartItem;
use crate::config::AppConfig;
use crate::entities::order::{self, OrderStatus, PaymentStatus};
use crate::entities::order_item;
use crate::entities::order_status_history;
use crate::entities::product;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

const ORDER_NUMBER_PREFIX: &str = "ORD-";
const ORDER_NUMBER_HEX_LEN: usize = 8;

/// Pricing knobs applied at order assembly, lifted out of [`AppConfig`]
/// once so the hot path works in `Decimal` throughout.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub tax_rate: Decimal,
    pub flat_shipping_rate: Decimal,
    pub free_shipping_threshold: Decimal,
}

impl PricingConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        // Config validation guarantees these are finite.
        Self {
            tax_rate: Decimal::from_f64_retain(config.default_tax_rate).unwrap_or_default(),
            flat_shipping_rate: Decimal::from_f64_retain(config.flat_shipping_rate)
                .unwrap_or_default(),
            free_shipping_threshold: Decimal::from_f64_retain(config.free_shipping_threshold)
                .unwrap_or_default(),
        }
    }
}

/// Shipping destination captured at checkout and stored as a JSON snapshot
/// on the order row.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ShippingAddress {
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    #[validate(length(min = 5, max = 30))]
    pub phone: String,
    #[validate(length(min = 1, max = 300))]
    pub line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
}

/// Checkout request after schema validation.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub items: Vec<CartItem>,
    pub user_id: Option<Uuid>,
    pub payment_method: String,
    pub is_pick_up: bool,
    pub shipping_address: Option<ShippingAddress>,
    pub customer_note: Option<String>,
    pub discount: Decimal,
}

/// Monetary breakdown of an order at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping_cost: Decimal,
    pub discount: Decimal,
    pub total_amount: Decimal,
}

/// Computes the order totals. `total_amount = subtotal + shipping_cost +
/// tax - discount` by construction; shipping is zero for pickup and for
/// subtotals at or above the free-shipping threshold.
pub fn compute_totals(
    subtotal: Decimal,
    discount: Decimal,
    is_pick_up: bool,
    pricing: &PricingConfig,
) -> OrderTotals {
    let tax = (subtotal * pricing.tax_rate).round_dp(2);
    let shipping_cost = if is_pick_up || subtotal >= pricing.free_shipping_threshold {
        Decimal::ZERO
    } else {
        pricing.flat_shipping_rate
    };
    OrderTotals {
        subtotal,
        tax,
        shipping_cost,
        discount,
        total_amount: subtotal + shipping_cost + tax - discount,
    }
}

/// Full order read model: the row plus its item snapshots and status log.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub status_history: Vec<order_status_history::Model>,
}

/// Assembles carts into persisted orders and manages the order lifecycle.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    events: EventSender,
    pricing: PricingConfig,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, events: EventSender, pricing: PricingConfig) -> Self {
        Self { db, events, pricing }
    }

    /// Creates an order from a cart.
    ///
    /// Each line is re-read from the catalog and snapshotted into an
    /// `order_items` row at the price effective right now, so later catalog
    /// edits never alter this order. The order row, its items, and the
    /// seeded PENDING history entry are persisted in one transaction; any
    /// failure rolls everything back and no partial order becomes visible.
    ///
    /// Stock levels are not checked or decremented here.
    #[instrument(skip(self, request), fields(user_id = ?request.user_id, lines = request.items.len()))]
    pub async fn create_order(&self, request: CreateOrder) -> Result<order::Model, ServiceError> {
        if request.items.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".into()));
        }
        if request.discount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Discount cannot be negative".into(),
            ));
        }
        // Shipping address is required exactly when the order is delivered.
        let shipping_json = match (&request.shipping_address, request.is_pick_up) {
            (Some(address), false) => {
                address.validate()?;
                Some(serde_json::to_string(address).map_err(|e| {
                    ServiceError::InternalError(format!("address serialization: {e}"))
                })?)
            }
            (None, false) => {
                return Err(ServiceError::ValidationError(
                    "Shipping address is required for delivery orders".into(),
                ))
            }
            (_, true) => None,
        };

        let now = Utc::now();
        let order_id = Uuid::new_v4();

        // Authoritative snapshots come from the catalog, not the cart cookie.
        let mut item_models = Vec::with_capacity(request.items.len());
        let mut subtotal = Decimal::ZERO;
        for line in &request.items {
            let row = product::Entity::find_by_id(line.product_id)
                .one(self.db.as_ref())
                .await?
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "Product {} is no longer available",
                        line.product_id
                    ))
                })?;
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Invalid quantity for product {}",
                    row.code
                )));
            }
            let unit_price = row.effective_price(now);
            let line_subtotal = unit_price * Decimal::from(line.quantity);
            subtotal += line_subtotal;
            item_models.push(order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(row.id),
                name: Set(row.name),
                code: Set(row.code),
                image_path: Set(row.main_image_path),
                unit_price: Set(unit_price),
                quantity: Set(line.quantity),
                subtotal: Set(line_subtotal),
                created_at: Set(now),
            });
        }

        let totals = compute_totals(subtotal, request.discount, request.is_pick_up, &self.pricing);
        let order_number = self.generate_order_number().await?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            user_id: Set(request.user_id),
            subtotal: Set(totals.subtotal),
            tax: Set(totals.tax),
            shipping_cost: Set(totals.shipping_cost),
            discount: Set(totals.discount),
            total_amount: Set(totals.total_amount),
            payment_method: Set(request.payment_method),
            payment_status: Set(PaymentStatus::Pending),
            order_status: Set(OrderStatus::Pending),
            shipping_address: Set(shipping_json),
            is_pick_up: Set(request.is_pick_up),
            customer_note: Set(request.customer_note),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let txn = self.db.begin().await?;
        let created = order_model.insert(&txn).await?;
        for item in item_models {
            item.insert(&txn).await?;
        }
        order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(OrderStatus::Pending),
            changed_at: Set(now),
            note: Set(Some("Order placed".into())),
            changed_by: Set(request.user_id),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        self.events.send_or_log(Event::OrderCreated(order_id)).await;
        tracing::info!(%order_number, total = %created.total_amount, "Order created");
        Ok(created)
    }

    /// Generates a unique order number, `ORD-` + 8 uppercase hex characters.
    /// Retries unbounded on collision; uniqueness is ultimately backed by
    /// the database unique index, not by this loop.
    async fn generate_order_number(&self) -> Result<String, ServiceError> {
        loop {
            let candidate = random_order_number();
            let taken = order::Entity::find()
                .filter(order::Column::OrderNumber.eq(candidate.as_str()))
                .count(self.db.as_ref())
                .await?;
            if taken == 0 {
                return Ok(candidate);
            }
            tracing::warn!(%candidate, "order number collision, regenerating");
        }
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, id: Uuid) -> Result<OrderDetails, ServiceError> {
        let order = order::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;
        self.load_details(order).await
    }

    async fn load_details(&self, order: order::Model) -> Result<OrderDetails, ServiceError> {
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(self.db.as_ref())
            .await?;
        let status_history = order_status_history::Entity::find()
            .filter(order_status_history::Column::OrderId.eq(order.id))
            .order_by_asc(order_status_history::Column::ChangedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(OrderDetails {
            order,
            items,
            status_history,
        })
    }

    /// Orders for one user, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<order::Model>, ServiceError> {
        Ok(order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    /// Paginated order list for the back office, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = order::Entity::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Sets the order status and appends a history entry. Any status may
    /// follow any other; no transition table is enforced.
    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        id: Uuid,
        new_status: OrderStatus,
        note: Option<String>,
        changed_by: Option<Uuid>,
    ) -> Result<order::Model, ServiceError> {
        let order = order::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;
        let old_status = order.order_status;
        let now = Utc::now();

        let txn = self.db.begin().await?;
        let mut active: order::ActiveModel = order.into();
        active.order_status = Set(new_status);
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;
        order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(id),
            status: Set(new_status),
            changed_at: Set(now),
            note: Set(note),
            changed_by: Set(changed_by),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        self.events
            .send_or_log(Event::OrderStatusChanged {
                order_id: id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;
        Ok(updated)
    }

    /// Sets the payment status. Payment changes do not touch the order
    /// status log.
    #[instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        id: Uuid,
        new_status: PaymentStatus,
    ) -> Result<order::Model, ServiceError> {
        let order = order::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))?;
        let old_status = order.payment_status;

        let mut active: order::ActiveModel = order.into();
        active.payment_status = Set(new_status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(self.db.as_ref()).await?;

        self.events
            .send_or_log(Event::PaymentStatusChanged {
                order_id: id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;
        Ok(updated)
    }
}

fn random_order_number() -> String {
    const HEX: &[u8] = b"0123456789ABCDEF";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ORDER_NUMBER_HEX_LEN)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect();
    format!("{ORDER_NUMBER_PREFIX}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pricing() -> PricingConfig {
        PricingConfig {
            tax_rate: dec!(0.08),
            flat_shipping_rate: dec!(10),
            free_shipping_threshold: dec!(50),
        }
    }

    #[test]
    fn order_number_has_expected_shape() {
        for _ in 0..100 {
            let number = random_order_number();
            let suffix = number.strip_prefix("ORD-").expect("ORD- prefix");
            assert_eq!(suffix.len(), 8);
            assert!(suffix
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        }
    }

    #[test]
    fn sequential_order_numbers_do_not_collide() {
        let a = random_order_number();
        let b = random_order_number();
        assert_ne!(a, b);
    }

    #[test]
    fn total_is_subtotal_plus_shipping_plus_tax_minus_discount() {
        let totals = compute_totals(dec!(40), dec!(5), false, &pricing());
        assert_eq!(totals.tax, dec!(3.20));
        assert_eq!(totals.shipping_cost, dec!(10));
        assert_eq!(
            totals.total_amount,
            totals.subtotal + totals.shipping_cost + totals.tax - totals.discount
        );
        assert_eq!(totals.total_amount, dec!(48.20));
    }

    #[test]
    fn pickup_orders_ship_free() {
        let totals = compute_totals(dec!(10), Decimal::ZERO, true, &pricing());
        assert_eq!(totals.shipping_cost, Decimal::ZERO);
    }

    #[test]
    fn free_shipping_threshold_applies_at_boundary() {
        assert_eq!(
            compute_totals(dec!(50), Decimal::ZERO, false, &pricing()).shipping_cost,
            Decimal::ZERO
        );
        assert_eq!(
            compute_totals(dec!(49.99), Decimal::ZERO, false, &pricing()).shipping_cost,
            dec!(10)
        );
    }

    #[test]
    fn shipping_address_validation() {
        let address = ShippingAddress {
            full_name: "Ada Lovelace".into(),
            phone: "+44 20 7946 0958".into(),
            line1: "12 Analytical Row".into(),
            line2: None,
            city: "London".into(),
            postal_code: "N1 9GU".into(),
        };
        assert!(address.validate().is_ok());

        let bad = ShippingAddress {
            full_name: "".into(),
            ..address
        };
        assert!(bad.validate().is_err());
    }
}
