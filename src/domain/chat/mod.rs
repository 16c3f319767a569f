//! Chat vocabulary: message views, mutations, sequenced events and rooms.

mod event;
mod message;
mod room;
mod sequence;

pub use event::{ChannelEvent, ChannelMutation, MutationRequest, NewMessage, SequencedEvent};
pub use message::{Attachment, MessageView, OrderKey, ReactionSummary, Reactions};
pub use room::RoomId;
pub use sequence::ChannelSequence;
