// Wire-protocol boundary
//
// Translates client frames into ConnectionHandler lifecycle calls. Socket
// framing lives here so the handler and translator stay transport-free.

pub mod listener;
pub mod messages;

pub use listener::{handle_connection, run, ProtocolContext};
pub use messages::{ClientMessage, ServerMessage, WireColumn};
