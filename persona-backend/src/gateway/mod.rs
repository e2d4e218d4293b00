//! Realtime chat channel: wire protocol, per-session rooms and the /ws handler

pub mod protocol;
pub mod rooms;
pub mod ws;

pub use rooms::ChatRooms;
