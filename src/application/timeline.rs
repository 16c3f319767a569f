//! Client reconciliation: a channel timeline fed by REST history and live events.
//!
//! Wraps a [`ClientWindow`] with the fetch side: page numbering, jump-to-
//! message context loading, and resync after a reconnect. While a resync is
//! in flight, live events are buffered and replayed on top of the fresh page
//! so nothing observed during the gap is lost.

use std::sync::Arc;

use crate::domain::chat::{MessageView, SequencedEvent};
use crate::domain::foundation::{ChannelId, MessageId, UserId};
use crate::domain::timeline::{ApplyOutcome, ClientWindow, MergeOutcome};
use crate::ports::{HistoryError, HistoryFetcher};

/// Page sizes used by a timeline.
#[derive(Debug, Clone, Copy)]
pub struct TimelineConfig {
    /// Messages per history page.
    pub page_size: u32,
    /// Messages fetched on each side of a jump target.
    pub context_radius: u32,
    /// Live events held while resyncing. On overflow the buffer is dropped
    /// and the reload alone restores the window.
    pub resync_buffer: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            context_radius: 25,
            resync_buffer: 1000,
        }
    }
}

/// Result of [`ChannelTimeline::jump_to_context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpOutcome {
    /// Target was already loaded; the window is unchanged.
    AlreadyLoaded,
    /// Window replaced with `count` messages around the target.
    Loaded { count: usize },
}

/// Result of [`ChannelTimeline::apply_live_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveOutcome {
    Applied(ApplyOutcome),
    /// Held until the in-flight resync completes.
    Buffered,
}

enum SyncState {
    Synced,
    Resyncing { buffered: Vec<SequencedEvent> },
}

/// One channel's client-side message timeline.
pub struct ChannelTimeline {
    window: ClientWindow,
    fetcher: Arc<dyn HistoryFetcher>,
    config: TimelineConfig,
    next_page: u32,
    sync: SyncState,
}

impl ChannelTimeline {
    pub fn new(
        channel_id: ChannelId,
        viewer: UserId,
        fetcher: Arc<dyn HistoryFetcher>,
        config: TimelineConfig,
    ) -> Self {
        Self {
            window: ClientWindow::new(channel_id).with_viewer(viewer),
            fetcher,
            config,
            next_page: 1,
            sync: SyncState::Synced,
        }
    }

    pub fn window(&self) -> &ClientWindow {
        &self.window
    }

    pub fn messages(&self) -> impl Iterator<Item = &MessageView> {
        self.window.messages()
    }

    pub fn is_resyncing(&self) -> bool {
        matches!(self.sync, SyncState::Resyncing { .. })
    }

    /// Load the newest page and follow the live tail.
    pub async fn load_initial(&mut self) -> Result<(), HistoryError> {
        let channel_id = self.window.channel_id();
        let page = self
            .fetcher
            .fetch_page(&channel_id, 1, self.config.page_size)
            .await?;
        self.window.load_initial(page);
        self.next_page = 2;
        Ok(())
    }

    /// Load the next older page, if there is one.
    pub async fn load_older(&mut self) -> Result<MergeOutcome, HistoryError> {
        if !self.window.can_load_older() {
            return Ok(MergeOutcome::default());
        }
        let channel_id = self.window.channel_id();
        let page = self
            .fetcher
            .fetch_page(&channel_id, self.next_page, self.config.page_size)
            .await?;
        let outcome = self.window.prepend_older(page);
        self.next_page += 1;
        tracing::trace!(
            channel_id = %channel_id,
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            "older page merged"
        );
        Ok(outcome)
    }

    /// Apply a live event, or buffer it while resyncing.
    ///
    /// Buffered events all precede the reload's fetch, so dropping them on
    /// overflow loses nothing the newest page does not already carry.
    pub fn apply_live_event(&mut self, event: SequencedEvent) -> LiveOutcome {
        match &mut self.sync {
            SyncState::Resyncing { buffered } => {
                if buffered.len() >= self.config.resync_buffer {
                    tracing::warn!(
                        channel_id = %self.window.channel_id(),
                        dropped = buffered.len(),
                        "resync buffer full, relying on reload"
                    );
                    buffered.clear();
                }
                buffered.push(event);
                LiveOutcome::Buffered
            }
            SyncState::Synced => LiveOutcome::Applied(self.window.apply_live_event(&event)),
        }
    }

    /// Show the neighbourhood of `message_id`.
    ///
    /// Fetches `context_radius` messages on each side of the target and
    /// replaces the window. Pagination stays off until [`Self::return_to_live`].
    pub async fn jump_to_context(&mut self, message_id: MessageId) -> Result<JumpOutcome, HistoryError> {
        if self.window.contains(&message_id) {
            return Ok(JumpOutcome::AlreadyLoaded);
        }

        let channel_id = self.window.channel_id();
        let target = self
            .fetcher
            .fetch_message(&channel_id, &message_id)
            .await?
            .ok_or(HistoryError::NotFound(message_id))?;

        let radius = self.config.context_radius;
        let (before, after) = tokio::try_join!(
            self.fetcher.fetch_before(&channel_id, &message_id, radius),
            self.fetcher.fetch_after(&channel_id, &message_id, radius),
        )?;

        let mut messages = before.messages;
        messages.push(target);
        messages.extend(after.messages);
        messages.sort_by_key(MessageView::order_key);

        self.window.replace_with_context(message_id, messages);
        tracing::debug!(
            channel_id = %channel_id,
            message_id = %message_id,
            count = self.window.len(),
            "jumped to message context"
        );
        Ok(JumpOutcome::Loaded {
            count: self.window.len(),
        })
    }

    /// Leave context mode and reload the newest page.
    pub async fn return_to_live(&mut self) -> Result<(), HistoryError> {
        self.load_initial().await
    }

    /// Start buffering live events ahead of a resync.
    pub fn begin_resync(&mut self) {
        if let SyncState::Synced = self.sync {
            self.sync = SyncState::Resyncing {
                buffered: Vec::new(),
            };
        }
    }

    /// Reload the newest page and replay everything buffered since
    /// [`Self::begin_resync`].
    ///
    /// On failure the timeline keeps buffering, up to
    /// [`TimelineConfig::resync_buffer`] events, so the caller can retry.
    pub async fn resync(&mut self) -> Result<usize, HistoryError> {
        self.begin_resync();
        self.load_initial().await?;

        let buffered = match std::mem::replace(&mut self.sync, SyncState::Synced) {
            SyncState::Resyncing { buffered } => buffered,
            SyncState::Synced => Vec::new(),
        };
        let replayed = buffered.len();
        for event in &buffered {
            self.window.apply_live_event(event);
        }
        tracing::debug!(
            channel_id = %self.window.channel_id(),
            replayed,
            "timeline resynced"
        );
        Ok(replayed)
    }
}
