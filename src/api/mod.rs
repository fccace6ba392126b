//! HTTP API for the administrative and presentation surfaces

pub mod routes;
pub mod server;

pub use routes::{ApiResponse, ErrorResponse, StatusResponse};
pub use server::{ApiServer, AppState, ServerError};
