//! Channel event sequencer: one actor per active channel.
//!
//! # Architecture
//!
//! ```text
//!  publish(req) ──▶ mpsc ──▶ channel actor ──┬─ access check
//!       ▲                     (one per        ├─ MessageStore apply
//!       │                      channel)       ├─ assign sequence
//!       └──── oneshot reply ◀─────────────────┴─ broadcast to channel room
//! ```
//!
//! Mutations for one channel are applied and routed strictly one at a time,
//! so every member observes them in sequence order. Different channels run
//! in parallel. An actor retires after an idle period and removes itself
//! from the actor map. Only its counter and last timestamp outlive it; the
//! next publish spawns a fresh actor that continues the numbering.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};

use crate::domain::chat::{
    ChannelEvent, ChannelMutation, ChannelSequence, MessageView, MutationRequest, RoomId,
    SequencedEvent,
};
use crate::domain::foundation::{ChannelId, DomainError, MessageId, Timestamp, UserId};
use crate::domain::protocol::ServerEvent;
use crate::ports::{AccessChecker, AccessResult, Capability, MessageStore, RoomBroadcaster};

/// Sequencer tunables.
#[derive(Debug, Clone, Copy)]
pub struct SequencerConfig {
    /// Pending mutations per channel before `publish` waits.
    pub queue_capacity: usize,
    /// Actor exits after this long without work.
    pub idle_timeout: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

struct Job {
    request: MutationRequest,
    reply: oneshot::Sender<Result<SequencedEvent, DomainError>>,
}

struct Inner {
    store: Arc<dyn MessageStore>,
    access: Arc<dyn AccessChecker>,
    broadcaster: Arc<dyn RoomBroadcaster>,
    config: SequencerConfig,
    actors: Mutex<HashMap<ChannelId, mpsc::Sender<Job>>>,
    // Counter and last timestamp only; kept across actor retirement.
    sequences: Mutex<HashMap<ChannelId, Arc<Mutex<ChannelSequence>>>>,
}

/// Serializes mutations per channel and broadcasts the accepted ones.
#[derive(Clone)]
pub struct ChannelSequencer {
    inner: Arc<Inner>,
}

impl ChannelSequencer {
    pub fn new(
        store: Arc<dyn MessageStore>,
        access: Arc<dyn AccessChecker>,
        broadcaster: Arc<dyn RoomBroadcaster>,
        config: SequencerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                access,
                broadcaster,
                config,
                actors: Mutex::new(HashMap::new()),
                sequences: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Submit a mutation and wait for its sequenced event.
    ///
    /// Returns only after the event has been handed to every member of the
    /// channel room. Rejected mutations consume no sequence number.
    pub async fn publish(&self, request: MutationRequest) -> Result<SequencedEvent, DomainError> {
        let channel_id = request.channel_id;
        let (reply, response) = oneshot::channel();
        let mut job = Job { request, reply };

        // A retiring actor closes its queue; one respawn is enough.
        for _ in 0..2 {
            let sender = self.actor_for(channel_id).await;
            match sender.send(job).await {
                Ok(()) => {
                    return response
                        .await
                        .map_err(|_| DomainError::internal("Channel sequencer stopped"))?;
                }
                Err(mpsc::error::SendError(returned)) => {
                    job = returned;
                    let mut actors = self.inner.actors.lock().await;
                    if actors.get(&channel_id).map_or(false, |s| s.same_channel(&sender)) {
                        actors.remove(&channel_id);
                    }
                }
            }
        }
        Err(DomainError::internal("Channel sequencer unavailable"))
    }

    /// Last sequence number assigned in `channel_id`, 0 if none.
    pub async fn last_sequence(&self, channel_id: ChannelId) -> u64 {
        let state = self.inner.sequences.lock().await.get(&channel_id).cloned();
        match state {
            Some(state) => state.lock().await.last_sequence(),
            None => 0,
        }
    }

    /// Channels with a running actor.
    pub async fn active_channels(&self) -> usize {
        self.inner
            .actors
            .lock()
            .await
            .values()
            .filter(|s| !s.is_closed())
            .count()
    }

    async fn actor_for(&self, channel_id: ChannelId) -> mpsc::Sender<Job> {
        let mut actors = self.inner.actors.lock().await;
        if let Some(sender) = actors.get(&channel_id) {
            if !sender.is_closed() {
                return sender.clone();
            }
        }

        let state = self
            .inner
            .sequences
            .lock()
            .await
            .entry(channel_id)
            .or_insert_with(|| Arc::new(Mutex::new(ChannelSequence::new(channel_id))))
            .clone();

        let (tx, rx) = mpsc::channel(self.inner.config.queue_capacity.max(1));
        tokio::spawn(run_channel(self.inner.clone(), channel_id, rx, state));
        actors.insert(channel_id, tx.clone());
        tracing::debug!(channel_id = %channel_id, "channel sequencer started");
        tx
    }
}

async fn run_channel(
    inner: Arc<Inner>,
    channel_id: ChannelId,
    mut jobs: mpsc::Receiver<Job>,
    state: Arc<Mutex<ChannelSequence>>,
) {
    loop {
        match tokio::time::timeout(inner.config.idle_timeout, jobs.recv()).await {
            Ok(Some(job)) => process(&inner, &state, job).await,
            Ok(None) => break,
            Err(_) => {
                jobs.close();
                while let Some(job) = jobs.recv().await {
                    process(&inner, &state, job).await;
                }
                break;
            }
        }
    }

    let mut actors = inner.actors.lock().await;
    if actors.get(&channel_id).map_or(false, |s| s.is_closed()) {
        actors.remove(&channel_id);
    }
    tracing::debug!(channel_id = %channel_id, "channel sequencer idle, stopping");
}

async fn process(inner: &Inner, state: &Mutex<ChannelSequence>, job: Job) {
    let Job { request, reply } = job;
    let mut sequence = state.lock().await;

    let result = apply(inner, &mut sequence, &request).await;
    match &result {
        Ok(event) => {
            let room = RoomId::Channel(event.channel_id);
            if let Err(e) = inner.broadcaster.broadcast(room, ServerEvent::from(event)).await {
                tracing::warn!(
                    channel_id = %event.channel_id,
                    sequence = event.sequence,
                    error = %e,
                    "channel event not delivered to every member"
                );
            }
            tracing::debug!(
                channel_id = %event.channel_id,
                sequence = event.sequence,
                event = event.event.event_name(),
                "channel event sequenced"
            );
        }
        Err(e) => {
            tracing::debug!(
                channel_id = %request.channel_id,
                mutation = request.mutation.kind(),
                code = %e.code,
                "mutation rejected"
            );
        }
    }

    // The requester may have gone away; the event is already broadcast.
    let _ = reply.send(result);
}

async fn apply(
    inner: &Inner,
    sequence: &mut ChannelSequence,
    request: &MutationRequest,
) -> Result<SequencedEvent, DomainError> {
    let channel_id = request.channel_id;
    let actor = &request.actor;
    let store = &inner.store;

    let event = match &request.mutation {
        ChannelMutation::Create(new) => {
            authorize(inner, actor, Capability::Post(channel_id)).await?;
            if let Some(parent) = new.reply_to_id {
                find_live(inner, &channel_id, &parent).await?;
            }
            let at = sequence.next_timestamp(Timestamp::now());
            let view = store.create(&channel_id, actor, new.clone(), at).await?;
            (at, ChannelEvent::MessageNew(view))
        }
        ChannelMutation::Edit {
            message_id,
            content,
        } => {
            let existing = find_live(inner, &channel_id, message_id).await?;
            authorize(
                inner,
                actor,
                Capability::Edit {
                    channel_id,
                    author: existing.author_id,
                },
            )
            .await?;
            let at = sequence.next_timestamp(Timestamp::now());
            let view = store.edit(&channel_id, message_id, content.clone(), at).await?;
            (at, ChannelEvent::MessageUpdated(view))
        }
        ChannelMutation::Delete { message_id } => {
            let existing = find_live(inner, &channel_id, message_id).await?;
            authorize(
                inner,
                actor,
                Capability::Delete {
                    channel_id,
                    author: existing.author_id,
                },
            )
            .await?;
            let at = sequence.next_timestamp(Timestamp::now());
            let deleted_at = store.delete(&channel_id, message_id, at).await?;
            (
                at,
                ChannelEvent::MessageDeleted {
                    message_id: *message_id,
                    deleted_at,
                },
            )
        }
        ChannelMutation::ToggleReaction { message_id, emoji } => {
            find_live(inner, &channel_id, message_id).await?;
            authorize(inner, actor, Capability::React(channel_id)).await?;
            let at = sequence.next_timestamp(Timestamp::now());
            let view = store
                .toggle_reaction(&channel_id, message_id, actor, emoji, at)
                .await?;
            (
                at,
                ChannelEvent::ReactionUpdated {
                    message_id: *message_id,
                    reactions: view.reactions,
                    updated_at: view.updated_at,
                },
            )
        }
    };

    let (occurred_at, event) = event;
    Ok(sequence.append(actor.clone(), occurred_at, event))
}

async fn authorize(inner: &Inner, actor: &UserId, capability: Capability) -> Result<(), DomainError> {
    match inner.access.check(actor, &capability).await {
        Ok(AccessResult::Allowed) => Ok(()),
        Ok(AccessResult::Denied(reason)) => Err(DomainError::forbidden(reason)),
        Err(e) => {
            tracing::warn!(
                user_id = %actor,
                capability = capability.name(),
                error = %e,
                "access check failed, denying"
            );
            Err(DomainError::forbidden("Access check unavailable"))
        }
    }
}

async fn find_live(
    inner: &Inner,
    channel_id: &ChannelId,
    message_id: &MessageId,
) -> Result<MessageView, DomainError> {
    match inner.store.find(channel_id, message_id).await? {
        Some(view) if !view.is_deleted() => Ok(view),
        _ => Err(DomainError::message_not_found(message_id)),
    }
}
