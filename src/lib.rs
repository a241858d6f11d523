pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod page;
pub mod storage;

pub use app::{build_router, AppError, AppState};

#[cfg(test)]
pub mod testing;
