//! REST and WebSocket API

pub mod handlers;
pub mod item_handlers;
pub mod offer_handlers;
pub mod routes;
pub mod trade_handlers;
pub mod user_handlers;
pub mod ws_handlers;

pub use handlers::AppError;
pub use routes::create_router;
