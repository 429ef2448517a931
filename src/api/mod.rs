pub mod handlers;
pub mod routes;
pub mod session;
pub mod state;

pub use routes::create_router;
pub use session::{AuthSession, SessionStore, SESSION_COOKIE};
pub use state::{AppState, AuthSettings};
