pub mod auth;
pub mod cart;
pub mod checkout;
pub mod common;
pub mod issues;
pub mod orders;
pub mod products;
pub mod users;
