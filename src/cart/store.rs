use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::product;

/// One cart line. Carries enough of the product to render and price the
/// line without a catalog lookup; the authoritative snapshot is still taken
/// from the catalog row at order creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub product_id: Uuid,
    pub name: String,
    pub product_type: String,
    pub unit_price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_end_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_image_path: Option<String>,
    pub quantity: i32,
}

impl CartItem {
    pub fn from_product(product: &product::Model) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            product_type: product.product_type.clone(),
            unit_price: product.unit_price,
            sale_price: product.sale_price,
            sale_end_date: product.sale_end_date,
            main_image_path: product.main_image_path.clone(),
            quantity: 1,
        }
    }

    /// Sale price applies while the sale window is open, otherwise the
    /// regular unit price. A sale price without an end date never applies.
    pub fn effective_price(&self, now: DateTime<Utc>) -> Decimal {
        match (self.sale_price, self.sale_end_date) {
            (Some(sale), Some(end)) if end > now => sale,
            _ => self.unit_price,
        }
    }

    pub fn line_subtotal(&self, now: DateTime<Utc>) -> Decimal {
        self.effective_price(now) * Decimal::from(self.quantity)
    }
}

/// Cart state container. Pure: every operation mutates in-memory state
/// only; persistence is the caller's explicit side effect (see
/// [`super::cookie::CartJar`]). Lines keep insertion order and are keyed
/// uniquely by product id. Totals are derived on every read, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CartStore {
    pub items: Vec<CartItem>,
    /// UI flag for the cart drawer; opened on add, toggled on demand
    pub open: bool,
}

impl CartStore {
    /// Adds a product: an existing line gets its quantity bumped, a new
    /// product gets a fresh line with quantity 1. Opens the cart either way.
    /// Stock is deliberately not checked here.
    pub fn add_to_cart(&mut self, item: CartItem) {
        match self.items.iter_mut().find(|l| l.product_id == item.product_id) {
            Some(line) => line.quantity += 1,
            None => self.items.push(CartItem { quantity: 1, ..item }),
        }
        self.open = true;
    }

    /// Removes the matching line; a miss is a no-op.
    pub fn remove_from_cart(&mut self, product_id: Uuid) {
        self.items.retain(|l| l.product_id != product_id);
    }

    /// Applies a signed delta to a line's quantity, floored at 1. Shrinking
    /// never removes the line; removal is only ever explicit.
    pub fn update_quantity(&mut self, product_id: Uuid, delta: i32) {
        if let Some(line) = self.items.iter_mut().find(|l| l.product_id == product_id) {
            line.quantity = line.quantity.saturating_add(delta).max(1);
        }
    }

    /// Flips the drawer flag; no business effect.
    pub fn toggle_cart(&mut self) {
        self.open = !self.open;
    }

    pub fn cart_total(&self, now: DateTime<Utc>) -> Decimal {
        self.items.iter().map(|l| l.line_subtotal(now)).sum()
    }

    pub fn cart_count(&self) -> i32 {
        self.items
            .iter()
            .fold(0i32, |count, l| count.saturating_add(l.quantity))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Serializes the full cart as one JSON snapshot.
    pub fn to_snapshot(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Re-hydrates a snapshot. A malformed snapshot is logged and discarded,
    /// degrading to an empty cart rather than an error.
    pub fn from_snapshot(snapshot: &str) -> Self {
        match serde_json::from_str(snapshot) {
            Ok(cart) => cart,
            Err(err) => {
                tracing::warn!(%err, "discarding malformed cart snapshot");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(id: Uuid, price: Decimal, quantity: i32) -> CartItem {
        CartItem {
            product_id: id,
            name: "Widget".into(),
            product_type: "gadget".into(),
            unit_price: price,
            sale_price: None,
            sale_end_date: None,
            main_image_path: None,
            quantity,
        }
    }

    #[test]
    fn adding_same_product_twice_increments_quantity() {
        let id = Uuid::new_v4();
        let mut cart = CartStore::default();
        cart.add_to_cart(item(id, dec!(10), 1));
        cart.add_to_cart(item(id, dec!(10), 1));
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 2);
    }

    #[test]
    fn adding_opens_the_cart() {
        let mut cart = CartStore::default();
        assert!(!cart.open);
        cart.add_to_cart(item(Uuid::new_v4(), dec!(5), 1));
        assert!(cart.open);
    }

    #[test]
    fn quantity_never_drops_below_one() {
        let id = Uuid::new_v4();
        let mut cart = CartStore::default();
        cart.add_to_cart(item(id, dec!(10), 1));
        cart.update_quantity(id, -100);
        assert_eq!(cart.items[0].quantity, 1);
        cart.update_quantity(id, 3);
        assert_eq!(cart.items[0].quantity, 4);
    }

    #[test]
    fn extreme_quantity_deltas_saturate_instead_of_overflowing() {
        let id = Uuid::new_v4();
        let mut cart = CartStore::default();
        cart.add_to_cart(item(id, dec!(10), 1));
        cart.update_quantity(id, i32::MAX);
        assert_eq!(cart.items[0].quantity, i32::MAX);
        cart.update_quantity(id, i32::MAX);
        assert_eq!(cart.items[0].quantity, i32::MAX);
        cart.update_quantity(id, i32::MIN);
        assert_eq!(cart.items[0].quantity, 1);
    }

    #[test]
    fn cart_count_saturates_on_huge_quantities() {
        let mut cart = CartStore::default();
        cart.add_to_cart(item(Uuid::new_v4(), dec!(1), 1));
        cart.add_to_cart(item(Uuid::new_v4(), dec!(1), 1));
        for line in &mut cart.items {
            line.quantity = i32::MAX;
        }
        assert_eq!(cart.cart_count(), i32::MAX);
    }

    #[test]
    fn updating_quantity_of_missing_line_is_a_noop() {
        let mut cart = CartStore::default();
        cart.add_to_cart(item(Uuid::new_v4(), dec!(10), 1));
        cart.update_quantity(Uuid::new_v4(), 5);
        assert_eq!(cart.items[0].quantity, 1);
    }

    #[test]
    fn removing_missing_product_is_a_noop() {
        let mut cart = CartStore::default();
        cart.add_to_cart(item(Uuid::new_v4(), dec!(10), 1));
        cart.remove_from_cart(Uuid::new_v4());
        assert_eq!(cart.items.len(), 1);
    }

    #[test]
    fn cart_total_sums_line_subtotals() {
        let mut cart = CartStore::default();
        let a = Uuid::new_v4();
        cart.add_to_cart(item(a, dec!(10), 1));
        cart.add_to_cart(item(a, dec!(10), 1));
        cart.add_to_cart(item(Uuid::new_v4(), dec!(5), 1));
        assert_eq!(cart.cart_total(Utc::now()), dec!(25));
        assert_eq!(cart.cart_count(), 3);
    }

    #[test]
    fn sale_price_applies_only_while_window_open() {
        let now = Utc::now();
        let mut line = item(Uuid::new_v4(), dec!(100), 1);
        line.sale_price = Some(dec!(60));
        line.sale_end_date = Some(now + chrono::Duration::hours(1));
        assert_eq!(line.effective_price(now), dec!(60));

        line.sale_end_date = Some(now - chrono::Duration::hours(1));
        assert_eq!(line.effective_price(now), dec!(100));

        line.sale_end_date = None;
        assert_eq!(line.effective_price(now), dec!(100));
    }

    #[test]
    fn corrupt_snapshot_loads_as_empty_cart() {
        for snapshot in ["not json", "{\"items\": 3}", "", "[1,2,3]"] {
            let cart = CartStore::from_snapshot(snapshot);
            assert!(cart.is_empty(), "snapshot {snapshot:?} should yield empty cart");
        }
    }

    #[test]
    fn snapshot_round_trip_preserves_order_and_flag() {
        let mut cart = CartStore::default();
        cart.add_to_cart(item(Uuid::new_v4(), dec!(1), 1));
        cart.add_to_cart(item(Uuid::new_v4(), dec!(2), 1));
        cart.toggle_cart(); // close it
        let restored = CartStore::from_snapshot(&cart.to_snapshot());
        assert_eq!(restored, cart);
    }
}
