//! Wire types, framing codec, the messaging client/server traits, a TCP
//! implementation, and the broadcaster that sits on top of them (§4.H,
//! §5, §6).

pub mod broadcaster;
pub mod codec;
pub mod transport;
pub mod wire;

pub use broadcaster::Broadcaster;
pub use codec::{decode, encode, framing_codec};
pub use transport::{
    MessagingClient, RequestHandler, TcpMessagingClient, TcpMessagingServer, DEFAULT_REQUEST_TIMEOUT,
    PROBE_REQUEST_TIMEOUT,
};
