pub mod cookie;
pub mod store;

pub use cookie::CartJar;
pub use store::{CartItem, CartStore};
