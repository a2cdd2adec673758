pub mod extract;
pub mod guard;
pub mod password;
pub mod session;

pub use extract::CurrentSession;
pub use guard::{authorize, evaluate, session_guard, AuthDecision, GuardRule};
pub use session::{Session, Sessions};
