//! Network Layer
//!
//! Everything between the simulation and a transport: the binary frame
//! format, delta encoding, fan-out and the session façade. Sockets are not
//! handled here; a transport plugs in through [`Outbound`] channels and a
//! [`Broadcaster`].
//!
//! [`Outbound`]: crate::game::player::Outbound

pub mod protocol;
pub mod delta;
pub mod broadcast;
pub mod session;

pub use protocol::{ClientCommand, ClientEvent, DecodedFrame, DecodedRecord, ProtocolError};
pub use delta::DeltaEncoder;
pub use broadcast::{Broadcaster, ChannelBroadcaster};
pub use session::{GameSession, SessionConfig, SessionError};
