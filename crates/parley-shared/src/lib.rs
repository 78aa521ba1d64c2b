pub mod constants;
pub mod ids;
pub mod protocol;

pub use ids::IdGenerator;
pub use protocol::{
    normalize_avatar, AvData, AvResponse, ChatFrame, ChatResponse, Envelope, InboundMessage,
    MessageKind, Payload, ProtocolError,
};
