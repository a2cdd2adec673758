pub mod issues;
pub mod orders;
pub mod products;
pub mod users;

pub use issues::IssueService;
pub use orders::OrderService;
pub use products::ProductService;
pub use users::UserService;
