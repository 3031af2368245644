//! WebSocket module - permission push channel

pub mod hub;

pub use hub::{serve_ws, Hub, WsMessage};
