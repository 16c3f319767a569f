//! Per-channel ordering state owned by the channel's sequencer actor.

use crate::domain::foundation::{ChannelId, Timestamp, UserId};

use super::event::{ChannelEvent, SequencedEvent};

/// Monotonic sequence counter for one channel.
///
/// Timestamps handed out by [`ChannelSequence::next_timestamp`] are strictly
/// increasing, so `(createdAt, id)` order of created messages agrees with
/// sequence order even when the wall clock stalls or steps backwards.
#[derive(Debug, Clone)]
pub struct ChannelSequence {
    channel_id: ChannelId,
    last_sequence: u64,
    last_timestamp: Option<Timestamp>,
}

impl ChannelSequence {
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            last_sequence: 0,
            last_timestamp: None,
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// A timestamp strictly after every one previously appended.
    pub fn next_timestamp(&self, now: Timestamp) -> Timestamp {
        match self.last_timestamp {
            Some(last) if !now.is_after(&last) => last.plus_millis(1),
            _ => now,
        }
    }

    /// Assigns the next sequence number to an accepted event.
    pub fn append(
        &mut self,
        actor: UserId,
        occurred_at: Timestamp,
        event: ChannelEvent,
    ) -> SequencedEvent {
        self.last_sequence += 1;
        self.last_timestamp = Some(occurred_at);

        SequencedEvent {
            channel_id: self.channel_id,
            sequence: self.last_sequence,
            actor,
            occurred_at,
            event,
        }
    }
}
