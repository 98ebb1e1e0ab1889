//! WebSocket Real-Time Streaming
//!
//! Pushes the live sensor series to dashboard clients.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: tracks connections and relays series events to all of them
//! - **Handler**: WebSocket upgrade and per-connection message loop
//! - **Messages**: client and server message formats
//!
//! ## Protocol
//!
//! On connect the server sends `connected` followed by a `snapshot` of the
//! whole series. After that it sends `reading` for each appended reading,
//! `state` on synchronizer state changes, and a fresh `snapshot` after each
//! bulk load. Clients may send `ping` or `snapshot`.
//!
//! ## Example
//!
//! ```javascript
//! // Browser
//! const ws = new WebSocket('ws://localhost:8090/ws');
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'reading') chart.append(msg.reading);
//! };
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{ConnectionHub, ConnectionId, HubConfig, HubError};
pub use messages::{ClientMessage, ServerMessage};
