pub mod app;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod model;
pub mod state;

pub use app::App;
pub use identity::{CookieSigner, Owner};
pub use state::AppState;
