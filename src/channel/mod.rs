//! Push-channel module: wire protocol, connection ownership, and dispatch.
//!
//! The monitor speaks a JSON `{type, data}` envelope over one WebSocket. The
//! connection manager owns the socket and its retry loop, the router is the
//! single ordered consumer of inbound frames.

mod connection;
mod protocol;
mod router;

pub use connection::{ConnectionHandle, ConnectionManager, ConnectivityState, RECONNECT_DELAY};
pub use protocol::{
    classify, decode_frame, ClientFrame, Envelope, ProtocolError, ServerFrame, StatusUpdate,
    TestEvent, TestEventData,
};
pub use router::MessageRouter;
