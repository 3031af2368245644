//! Timesheet - project timesheet service backend
//!
//! This crate provides the permission engine (menu trees, role grants and
//! project data scope), the HTTP API over users, roles, permissions and
//! projects, and the WebSocket channel that pushes permission changes.

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod permission;
pub mod routes;
pub mod state;
pub mod store;
pub mod ws;

// Re-export commonly used types
pub use config::Config;
pub use state::AppState;
