/*
[INPUT]:  Stream configuration, transport, protocol adapter, subscriptions
[OUTPUT]: Live market and account events delivered to registered handlers
[POS]:    WebSocket layer - connection lifecycle and streaming engine
[UPDATE]: When adding stream kinds or changing connection logic
*/

pub mod channel;
pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod registry;
pub mod transport;

pub use channel::{ChannelKey, ChannelName, ChannelParam, ControlMessage, ControlMethod};
pub use client::StreamClient;
pub use connection::{ConnectionManager, ConnectionState, ReconnectPolicy, StreamConfig};
pub use dispatcher::{DispatchOutcome, Dispatcher, InstrumentCache, LogSampler};
pub use registry::{Handler, SubscriptionRegistry};
pub use transport::{
    Frame, FrameReader, FrameWriter, MockPeer, MockTransport, Transport, TungsteniteTransport,
};
