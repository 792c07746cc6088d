//! The admin request/response surface: tagged dispatch core plus a thin
//! `axum` HTTP adapter and session handling.

mod handler;
mod http;
mod request;

pub use handler::AdminHandler;
pub use http::AdminServer;
pub use request::{AdminRequest, AdminResponse};
