//now people using the types library can use these types
pub mod audio;
pub mod events;
pub mod tools;

//re-export types for easier access
pub use events::inbound::{GenerationStage, InboundEvent};
pub use events::outbound::OutboundEvent;
pub use events::{ContentType, DecodeError, Envelope, Role, decode_inbound, encode_event};
