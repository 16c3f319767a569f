//! Client-side message window reconciliation.
//!
//! A [`ClientWindow`] merges three sources into one ordered, duplicate-free
//! view of a channel:
//!
//! ```text
//!   REST pages (newest first, page N older than N-1)   ─┐
//!   REST context (before ∪ target ∪ after)             ─┼─▶ ClientWindow
//!   live SequencedEvents                               ─┘   BTreeMap<(createdAt, id), MessageView>
//! ```
//!
//! Page offsets drift while new messages arrive, so older pages may overlap
//! what is already loaded. Every merge deduplicates by id.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::domain::chat::{ChannelEvent, MessageView, OrderKey, SequencedEvent};
use crate::domain::foundation::{ChannelId, MessageId, UserId};

/// Deleted ids remembered per window; the oldest are forgotten first.
pub const TOMBSTONE_CAPACITY: usize = 1024;

/// One page of history as returned by the REST collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub messages: Vec<MessageView>,
    pub has_more: bool,
}

impl HistoryPage {
    pub fn new(messages: Vec<MessageView>, has_more: bool) -> Self {
        Self { messages, has_more }
    }
}

/// Whether the window is following the live tail or pinned around a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    Live,
    Context { anchor: MessageId },
}

/// Result of merging a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub duplicates: usize,
    /// First message before the merge; the UI keeps it in view.
    pub scroll_anchor: Option<MessageId>,
}

/// Result of applying one live event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Inserted,
    Updated,
    Removed,
    Ignored(IgnoreReason),
}

/// Why a live event left the window untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    OtherChannel,
    Duplicate,
    Stale,
    Deleted,
    NotLoaded,
    OutsideContext,
}

/// Ordered, deduplicated window over one channel's messages.
#[derive(Debug, Clone)]
pub struct ClientWindow {
    channel_id: ChannelId,
    viewer: Option<UserId>,
    entries: BTreeMap<OrderKey, MessageView>,
    index: HashMap<MessageId, OrderKey>,
    tombstones: HashSet<MessageId>,
    tombstone_order: VecDeque<MessageId>,
    has_more_older: bool,
    has_more_newer: bool,
    has_unseen_live: bool,
    mode: WindowMode,
    last_sequence: Option<u64>,
}

impl ClientWindow {
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            viewer: None,
            entries: BTreeMap::new(),
            index: HashMap::new(),
            tombstones: HashSet::new(),
            tombstone_order: VecDeque::new(),
            has_more_older: false,
            has_more_newer: false,
            has_unseen_live: false,
            mode: WindowMode::Live,
            last_sequence: None,
        }
    }

    /// Recompute `hasReacted` relative to `viewer` on every merge.
    pub fn with_viewer(mut self, viewer: UserId) -> Self {
        self.viewer = Some(viewer);
        self
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn mode(&self) -> WindowMode {
        self.mode
    }

    pub fn has_more_older(&self) -> bool {
        self.has_more_older
    }

    pub fn has_more_newer(&self) -> bool {
        self.has_more_newer
    }

    /// New messages arrived while pinned to a context.
    pub fn has_unseen_live(&self) -> bool {
        self.has_unseen_live
    }

    /// Highest live sequence applied since the last load.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn can_load_older(&self) -> bool {
        self.mode == WindowMode::Live && self.has_more_older
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&MessageView> {
        self.index.get(id).and_then(|key| self.entries.get(key))
    }

    /// Messages in ascending `(createdAt, id)` order.
    pub fn messages(&self) -> impl Iterator<Item = &MessageView> {
        self.entries.values()
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.entries.keys().map(|key| key.id).collect()
    }

    pub fn oldest(&self) -> Option<&MessageView> {
        self.entries.values().next()
    }

    pub fn newest(&self) -> Option<&MessageView> {
        self.entries.values().next_back()
    }

    /// Replaces the window with the newest page and returns to live mode.
    pub fn load_initial(&mut self, page: HistoryPage) {
        self.clear();
        self.mode = WindowMode::Live;
        self.has_more_older = page.has_more;
        self.has_more_newer = false;
        self.has_unseen_live = false;
        self.last_sequence = None;
        for message in page.messages {
            self.insert(message);
        }
    }

    /// Merges an older page, skipping anything already present.
    pub fn prepend_older(&mut self, page: HistoryPage) -> MergeOutcome {
        let mut outcome = MergeOutcome {
            scroll_anchor: self.oldest().map(|m| m.id),
            ..MergeOutcome::default()
        };
        for message in page.messages {
            if self.insert(message) {
                outcome.inserted += 1;
            } else {
                outcome.duplicates += 1;
            }
        }
        if self.mode == WindowMode::Live {
            self.has_more_older = page.has_more;
        }
        outcome
    }

    /// Replaces the window with the neighbourhood of `anchor`.
    ///
    /// Pagination stays disabled until the next [`ClientWindow::load_initial`].
    pub fn replace_with_context(&mut self, anchor: MessageId, messages: Vec<MessageView>) {
        self.clear();
        self.mode = WindowMode::Context { anchor };
        self.has_more_older = false;
        self.has_more_newer = false;
        self.has_unseen_live = false;
        for message in messages {
            self.insert(message);
        }
    }

    /// Applies a live event, keyed by message id.
    pub fn apply_live_event(&mut self, event: &SequencedEvent) -> ApplyOutcome {
        if event.channel_id != self.channel_id {
            return ApplyOutcome::Ignored(IgnoreReason::OtherChannel);
        }
        self.last_sequence = Some(
            self.last_sequence
                .map_or(event.sequence, |seen| seen.max(event.sequence)),
        );

        match &event.event {
            ChannelEvent::MessageNew(view) => self.apply_new(view),
            ChannelEvent::MessageUpdated(view) => self.apply_update(view),
            ChannelEvent::MessageDeleted { message_id, .. } => {
                self.bury(*message_id);
                if self.remove(message_id).is_some() {
                    ApplyOutcome::Removed
                } else {
                    ApplyOutcome::Ignored(IgnoreReason::NotLoaded)
                }
            }
            ChannelEvent::ReactionUpdated {
                message_id,
                reactions,
                updated_at,
            } => {
                let viewer = self.viewer.clone();
                let Some(key) = self.index.get(message_id).copied() else {
                    return ApplyOutcome::Ignored(IgnoreReason::NotLoaded);
                };
                let Some(current) = self.entries.get_mut(&key) else {
                    return ApplyOutcome::Ignored(IgnoreReason::NotLoaded);
                };
                if updated_at.is_before(&current.updated_at) {
                    return ApplyOutcome::Ignored(IgnoreReason::Stale);
                }
                current.reactions = reactions.clone();
                current.updated_at = *updated_at;
                if let Some(viewer) = &viewer {
                    current.personalize(viewer);
                }
                ApplyOutcome::Updated
            }
        }
    }

    fn apply_new(&mut self, view: &MessageView) -> ApplyOutcome {
        if self.tombstones.contains(&view.id) || view.is_deleted() {
            return ApplyOutcome::Ignored(IgnoreReason::Deleted);
        }
        if self.contains(&view.id) {
            return match self.apply_update(view) {
                ApplyOutcome::Updated => ApplyOutcome::Updated,
                _ => ApplyOutcome::Ignored(IgnoreReason::Duplicate),
            };
        }
        if let WindowMode::Context { .. } = self.mode {
            let beyond_newest = self
                .newest()
                .map_or(true, |newest| view.order_key() > newest.order_key());
            if beyond_newest {
                self.has_unseen_live = true;
                return ApplyOutcome::Ignored(IgnoreReason::OutsideContext);
            }
        }
        self.insert(view.clone());
        ApplyOutcome::Inserted
    }

    fn apply_update(&mut self, view: &MessageView) -> ApplyOutcome {
        if self.tombstones.contains(&view.id) {
            return ApplyOutcome::Ignored(IgnoreReason::Deleted);
        }
        let Some(current) = self.get(&view.id) else {
            return ApplyOutcome::Ignored(IgnoreReason::NotLoaded);
        };
        if view.updated_at.is_before(&current.updated_at) {
            return ApplyOutcome::Ignored(IgnoreReason::Stale);
        }
        let mut incoming = view.clone();
        if let Some(viewer) = &self.viewer {
            incoming.personalize(viewer);
        }
        if &incoming == current {
            return ApplyOutcome::Ignored(IgnoreReason::Duplicate);
        }
        self.remove(&view.id);
        if view.is_deleted() {
            self.bury(view.id);
            return ApplyOutcome::Removed;
        }
        self.insert(incoming);
        ApplyOutcome::Updated
    }

    /// Inserts unless already present or deleted. Returns true on insert.
    fn insert(&mut self, mut message: MessageView) -> bool {
        if message.channel_id != self.channel_id
            || message.is_deleted()
            || self.tombstones.contains(&message.id)
            || self.index.contains_key(&message.id)
        {
            return false;
        }
        if let Some(viewer) = &self.viewer {
            message.personalize(viewer);
        }
        let key = message.order_key();
        self.index.insert(message.id, key);
        self.entries.insert(key, message);
        true
    }

    fn remove(&mut self, id: &MessageId) -> Option<MessageView> {
        let key = self.index.remove(id)?;
        self.entries.remove(&key)
    }

    fn bury(&mut self, id: MessageId) {
        if !self.tombstones.insert(id) {
            return;
        }
        self.tombstone_order.push_back(id);
        while self.tombstone_order.len() > TOMBSTONE_CAPACITY {
            if let Some(oldest) = self.tombstone_order.pop_front() {
                self.tombstones.remove(&oldest);
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;
    use proptest::prelude::*;

    fn alice() -> UserId {
        UserId::new("alice").unwrap()
    }

    fn message_at(channel: ChannelId, base: Timestamp, offset_ms: i64) -> MessageView {
        MessageView::new(channel, alice(), format!("m{}", offset_ms), base.plus_millis(offset_ms))
    }

    fn sequenced(sequence: u64, event: ChannelEvent, channel: ChannelId) -> SequencedEvent {
        SequencedEvent {
            channel_id: channel,
            sequence,
            actor: alice(),
            occurred_at: Timestamp::now(),
            event,
        }
    }

    fn history(channel: ChannelId, count: i64) -> Vec<MessageView> {
        let base = Timestamp::now();
        (0..count).map(|i| message_at(channel, base, i * 10)).collect()
    }

    #[test]
    fn load_initial_orders_and_sets_flags() {
        let channel = ChannelId::new();
        let mut msgs = history(channel, 5);
        msgs.reverse();

        let mut window = ClientWindow::new(channel);
        window.load_initial(HistoryPage::new(msgs.clone(), true));

        msgs.reverse();
        let expected: Vec<_> = msgs.iter().map(|m| m.id).collect();
        assert_eq!(window.ids(), expected);
        assert!(window.can_load_older());
        assert!(!window.has_more_newer());
    }

    #[test]
    fn prepend_older_dedupes_overlap_from_offset_drift() {
        let channel = ChannelId::new();
        let all = history(channel, 10);
        let mut window = ClientWindow::new(channel);
        window.load_initial(HistoryPage::new(all[5..].to_vec(), true));

        // Offset drifted by two: the older page repeats two loaded messages.
        let outcome = window.prepend_older(HistoryPage::new(all[2..7].to_vec(), false));

        assert_eq!(outcome.inserted, 3);
        assert_eq!(outcome.duplicates, 2);
        assert_eq!(outcome.scroll_anchor, Some(all[5].id));
        assert_eq!(window.len(), 8);
        assert!(!window.has_more_older());
    }

    #[test]
    fn live_new_is_idempotent() {
        let channel = ChannelId::new();
        let mut window = ClientWindow::new(channel);
        let msg = history(channel, 1).remove(0);
        let event = sequenced(1, ChannelEvent::MessageNew(msg), channel);

        assert_eq!(window.apply_live_event(&event), ApplyOutcome::Inserted);
        assert_eq!(
            window.apply_live_event(&event),
            ApplyOutcome::Ignored(IgnoreReason::Duplicate)
        );
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn update_replaces_in_place_and_ignores_stale() {
        let channel = ChannelId::new();
        let original = history(channel, 1).remove(0);
        let mut window = ClientWindow::new(channel);
        window.load_initial(HistoryPage::new(vec![original.clone()], false));

        let mut edited = original.clone();
        edited.content = "edited".into();
        edited.updated_at = original.updated_at.plus_secs(5);
        let outcome =
            window.apply_live_event(&sequenced(2, ChannelEvent::MessageUpdated(edited), channel));
        assert_eq!(outcome, ApplyOutcome::Updated);

        let outcome = window
            .apply_live_event(&sequenced(1, ChannelEvent::MessageUpdated(original.clone()), channel));
        assert_eq!(outcome, ApplyOutcome::Ignored(IgnoreReason::Stale));
        assert_eq!(window.get(&original.id).unwrap().content, "edited");
    }

    #[test]
    fn delete_removes_and_blocks_late_arrivals() {
        let channel = ChannelId::new();
        let msg = history(channel, 1).remove(0);
        let mut window = ClientWindow::new(channel);
        window.load_initial(HistoryPage::new(vec![msg.clone()], false));

        let deleted = ChannelEvent::MessageDeleted {
            message_id: msg.id,
            deleted_at: Timestamp::now(),
        };
        assert_eq!(
            window.apply_live_event(&sequenced(2, deleted, channel)),
            ApplyOutcome::Removed
        );

        // A stale page still containing the message must not resurrect it.
        window.prepend_older(HistoryPage::new(vec![msg.clone()], false));
        assert!(!window.contains(&msg.id));
        assert_eq!(
            window.apply_live_event(&sequenced(1, ChannelEvent::MessageNew(msg), channel)),
            ApplyOutcome::Ignored(IgnoreReason::Deleted)
        );
    }

    #[test]
    fn tombstones_are_bounded_oldest_first() {
        let channel = ChannelId::new();
        let mut window = ClientWindow::new(channel);
        let ids: Vec<MessageId> = (0..TOMBSTONE_CAPACITY + 10).map(|_| MessageId::new()).collect();
        for (seq, id) in ids.iter().enumerate() {
            let deleted = ChannelEvent::MessageDeleted {
                message_id: *id,
                deleted_at: Timestamp::now(),
            };
            window.apply_live_event(&sequenced(seq as u64 + 1, deleted, channel));
        }

        assert_eq!(window.tombstones.len(), TOMBSTONE_CAPACITY);
        assert!(!window.tombstones.contains(&ids[0]));
        assert!(window.tombstones.contains(&ids[TOMBSTONE_CAPACITY + 9]));
    }

    #[test]
    fn reaction_update_for_unloaded_message_is_ignored() {
        let channel = ChannelId::new();
        let mut window = ClientWindow::new(channel);
        let event = ChannelEvent::ReactionUpdated {
            message_id: MessageId::new(),
            reactions: Default::default(),
            updated_at: Timestamp::now(),
        };
        assert_eq!(
            window.apply_live_event(&sequenced(1, event, channel)),
            ApplyOutcome::Ignored(IgnoreReason::NotLoaded)
        );
        assert!(window.is_empty());
    }

    #[test]
    fn reaction_update_personalizes_for_viewer() {
        let channel = ChannelId::new();
        let mut msg = history(channel, 1).remove(0);
        let mut window = ClientWindow::new(channel).with_viewer(alice());
        window.load_initial(HistoryPage::new(vec![msg.clone()], false));

        let at = msg.updated_at.plus_secs(1);
        msg.toggle_reaction(&alice(), "👍", at);
        let event = ChannelEvent::ReactionUpdated {
            message_id: msg.id,
            reactions: msg.reactions.clone(),
            updated_at: at,
        };
        window.apply_live_event(&sequenced(2, event, channel));

        assert!(window.get(&msg.id).unwrap().reactions["👍"].has_reacted);
    }

    #[test]
    fn events_for_other_channels_are_ignored() {
        let channel = ChannelId::new();
        let other = ChannelId::new();
        let mut window = ClientWindow::new(channel);
        let msg = history(other, 1).remove(0);
        assert_eq!(
            window.apply_live_event(&sequenced(1, ChannelEvent::MessageNew(msg), other)),
            ApplyOutcome::Ignored(IgnoreReason::OtherChannel)
        );
    }

    #[test]
    fn context_mode_disables_pagination_and_holds_back_new_tail() {
        let channel = ChannelId::new();
        let all = history(channel, 60);
        let mut window = ClientWindow::new(channel);
        window.load_initial(HistoryPage::new(all[50..].to_vec(), true));

        let anchor = all[20].id;
        window.replace_with_context(anchor, all[0..41].to_vec());
        assert_eq!(window.mode(), WindowMode::Context { anchor });
        assert!(!window.can_load_older());
        assert!(!window.has_more_newer());

        let fresh = message_at(channel, Timestamp::now(), 60_000);
        assert_eq!(
            window.apply_live_event(&sequenced(9, ChannelEvent::MessageNew(fresh), channel)),
            ApplyOutcome::Ignored(IgnoreReason::OutsideContext)
        );
        assert!(window.has_unseen_live());

        window.load_initial(HistoryPage::new(all[10..].to_vec(), true));
        assert_eq!(window.mode(), WindowMode::Live);
        assert!(window.can_load_older());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Prepend(Vec<usize>),
        Live(usize),
        Delete(usize),
    }

    fn op_strategy(pool: usize) -> impl Strategy<Value = Op> {
        prop_oneof![
            prop::collection::vec(0..pool, 0..8).prop_map(Op::Prepend),
            (0..pool).prop_map(Op::Live),
            (0..pool).prop_map(Op::Delete),
        ]
    }

    proptest! {
        #[test]
        fn window_stays_sorted_and_unique(
            initial in prop::collection::vec(0usize..40, 0..20),
            ops in prop::collection::vec(op_strategy(40), 0..40),
        ) {
            let channel = ChannelId::new();
            let base = Timestamp::now();
            // Several messages share a timestamp so the id tiebreak is exercised.
            let pool: Vec<MessageView> =
                (0..40).map(|i| message_at(channel, base, (i / 3) as i64)).collect();

            let mut window = ClientWindow::new(channel);
            window.load_initial(HistoryPage::new(
                initial.iter().map(|&i| pool[i].clone()).collect(),
                true,
            ));

            let mut deleted = HashSet::new();
            for (seq, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Prepend(indices) => {
                        window.prepend_older(HistoryPage::new(
                            indices.iter().map(|&i| pool[i].clone()).collect(),
                            true,
                        ));
                    }
                    Op::Live(i) => {
                        window.apply_live_event(&sequenced(
                            seq as u64 + 1,
                            ChannelEvent::MessageNew(pool[i].clone()),
                            channel,
                        ));
                    }
                    Op::Delete(i) => {
                        deleted.insert(pool[i].id);
                        window.apply_live_event(&sequenced(
                            seq as u64 + 1,
                            ChannelEvent::MessageDeleted {
                                message_id: pool[i].id,
                                deleted_at: base,
                            },
                            channel,
                        ));
                    }
                }
            }

            let keys: Vec<OrderKey> = window.messages().map(|m| m.order_key()).collect();
            prop_assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));

            let ids: HashSet<MessageId> = window.messages().map(|m| m.id).collect();
            prop_assert_eq!(ids.len(), window.len());
            prop_assert!(ids.is_disjoint(&deleted));
        }
    }
}
