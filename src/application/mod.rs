//! Application layer - the real-time engine services.
//!
//! These services orchestrate domain state machines and coordinate between
//! ports. Server-side: registry, presence, typing, sequencer, router and the
//! gateway that ties them together. Client-side: the channel timeline.

pub mod gateway;
pub mod presence;
pub mod registry;
pub mod router;
pub mod sequencer;
pub mod timeline;
pub mod typing;

pub use gateway::{ChatGateway, GatewayConfig};
pub use presence::{PresenceJoin, PresencePolicy, PresenceTracker};
pub use registry::{Connection, ConnectionHandle, ConnectionRegistry};
pub use router::BroadcastRouter;
pub use sequencer::{ChannelSequencer, SequencerConfig};
pub use timeline::{ChannelTimeline, JumpOutcome, LiveOutcome, TimelineConfig};
pub use typing::{TypingAggregator, TypingUpdate};
