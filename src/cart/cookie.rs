use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use super::store::CartStore;

const CART_COOKIE_MAX_AGE_DAYS: i64 = 30;

/// Persistence boundary for the cart: the whole cart rides as one
/// base64-encoded JSON snapshot in a dedicated cookie. Handlers load on
/// request entry and save after every mutation; nothing else touches it.
#[derive(Clone)]
pub struct CartJar {
    cookie_name: String,
}

impl CartJar {
    pub fn new(cookie_name: &str) -> Self {
        Self {
            cookie_name: cookie_name.to_string(),
        }
    }

    /// Loads the cart from the jar. Missing or malformed snapshots (at
    /// either the base64 or JSON layer) degrade to an empty cart.
    pub fn load(&self, jar: &CookieJar) -> CartStore {
        let Some(cookie) = jar.get(&self.cookie_name) else {
            return CartStore::default();
        };
        match URL_SAFE_NO_PAD.decode(cookie.value()) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(json) => CartStore::from_snapshot(&json),
                Err(_) => {
                    tracing::warn!("discarding non-utf8 cart cookie");
                    CartStore::default()
                }
            },
            Err(err) => {
                tracing::warn!(%err, "discarding undecodable cart cookie");
                CartStore::default()
            }
        }
    }

    /// Writes the cart snapshot back into the jar.
    pub fn save(&self, jar: CookieJar, cart: &CartStore) -> CookieJar {
        let value = URL_SAFE_NO_PAD.encode(cart.to_snapshot());
        let cookie = Cookie::build((self.cookie_name.clone(), value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::days(CART_COOKIE_MAX_AGE_DAYS))
            .build();
        jar.add(cookie)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::store::CartItem;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn save_then_load_round_trips() {
        let cart_jar = CartJar::new("cart");
        let mut cart = CartStore::default();
        cart.add_to_cart(CartItem {
            product_id: Uuid::new_v4(),
            name: "Mug".into(),
            product_type: "kitchen".into(),
            unit_price: dec!(12.50),
            sale_price: None,
            sale_end_date: None,
            main_image_path: None,
            quantity: 1,
        });

        let jar = cart_jar.save(CookieJar::new(), &cart);
        assert_eq!(cart_jar.load(&jar), cart);
    }

    #[test]
    fn missing_cookie_yields_empty_cart() {
        let cart_jar = CartJar::new("cart");
        assert!(cart_jar.load(&CookieJar::new()).is_empty());
    }

    #[test]
    fn corrupt_cookie_yields_empty_cart() {
        let cart_jar = CartJar::new("cart");
        let jar = CookieJar::new().add(Cookie::new("cart", "%%%not-base64%%%"));
        assert!(cart_jar.load(&jar).is_empty());
    }
}
