//! WebSocket terminal sessions

mod gateway;
mod notice;
mod supervisor;

pub use gateway::{ConnectParams, client_address, ws_handler};
