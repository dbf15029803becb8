//! HTTP surface: the form endpoints that sit behind the rate limiter.

mod routes;
mod server;

pub use routes::{router, AppState, FormRoute, RateLimited};
pub use server::HttpServer;
