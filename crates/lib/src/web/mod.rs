//! Web server: the chat page over HTTP plus one WebSocket per browser session.
//!
//! Single port serves the page, a health probe, and the session socket. Each socket owns its own
//! `SessionController`; requests on it are handled strictly in order.

mod protocol;
mod server;

pub use protocol::{event_frame, WsRequest, WsResponse};
pub use server::{router, run_server, ServerState};
