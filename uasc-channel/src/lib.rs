//! Secure channel core: chunk reassembly, the per-channel handshake/session
//! state machine, the channel registry, TCP wire framing, inbound frame
//! dispatch, and the cooperative event loop that ties them to a transport.

pub mod assembly;
pub mod dispatcher;
pub mod event_loop;
pub mod framing;
pub mod fsm;
pub mod registry;
pub mod transport;

pub use assembly::{AssemblyOutcome, MessageAssembly};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use event_loop::{ApplicationEvent, Event, EventLoop, LoopNotification, TimerEvent};
pub use framing::{encode_handshake_frame, FrameDecoder, TcpFrame};
pub use fsm::{Channel, ChannelState, NegotiatedParams, ReceiveOutcome, PROTOCOL_VERSION};
pub use registry::ChannelRegistry;
pub use transport::{SocketEvent, SocketHandle, Transport};
