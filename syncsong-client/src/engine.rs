//! Reconciliation Engine
//!
//! Central participant state machine. Consumes the room's inbound event
//! stream, drives the local player, and produces the outbound event stream
//! through the classifier, compensator and debouncer.
//!
//! **Responsibilities:**
//! - Track connection and player readiness (`Disconnected → Connecting →
//!   Syncing → Ready`)
//! - Apply authoritative events to the player behind an armed guard
//! - Relay user-driven player transitions exactly once
//! - Schedule the post-seek play as an epoch-tagged deferred action
//!
//! The engine is synchronous and never blocks: it does no I/O of its own,
//! takes the current wall-clock time as an argument, and leaves sending
//! frames and sleeping to the session driver.

use std::collections::VecDeque;
use std::time::Duration;

use syncsong_common::api::SearchResult;
use syncsong_common::media;
use syncsong_common::protocol::{PlayPayload, SyncStatePayload};
use syncsong_common::time::millis_to_secs;
use syncsong_common::{Role, SyncEvent};
use tracing::{debug, info, warn};

use crate::classifier::{ActionSourceClassifier, Classification};
use crate::compensation::LatencyCompensator;
use crate::debounce::SeekDebouncer;
use crate::error::Result;
use crate::player::{Player, PlayerEvent, PlayerState};

/// Desired playback status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    Playing,
    Paused,
}

impl Playback {
    fn settled_state(self) -> PlayerState {
        match self {
            Playback::Playing => PlayerState::Playing,
            Playback::Paused => PlayerState::Paused,
        }
    }
}

/// Externally visible engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Disconnected,
    Connecting,
    /// Channel open; waiting for authoritative state or for the player to
    /// become ready for the current media
    Syncing,
    Ready(Playback),
}

/// What the participant knows about the current media
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaStatus {
    Empty,
    Valid { video_id: String },
    /// No playable id could be extracted; shown as "invalid media"
    Invalid,
}

/// Optional participant features
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineFeatures {
    /// Track own role and the room roster
    pub roles: bool,
    /// Keep catalog search results for selection
    pub suggestions: bool,
}

impl Default for EngineFeatures {
    fn default() -> Self {
        Self {
            roles: true,
            suggestions: true,
        }
    }
}

impl EngineFeatures {
    /// Playback sync only
    pub fn minimal() -> Self {
        Self {
            roles: false,
            suggestions: false,
        }
    }
}

/// Post-seek play the driver must fire after `delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredPlay {
    pub epoch: u64,
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connection {
    Disconnected,
    Connecting,
    Open,
}

/// Last authoritative timeline statement
#[derive(Debug, Clone, Copy, PartialEq)]
struct Anchor {
    playing: bool,
    /// Nominal position in seconds, if the authority gave one
    position: Option<f64>,
    server_time: Option<i64>,
    /// Local wall clock when the statement arrived
    received_at: i64,
}

pub struct ReconciliationEngine<P: Player> {
    features: EngineFeatures,
    connection: Connection,
    player: Option<P>,
    player_ready: bool,
    /// Best knowledge of the player's state, updated on our own mutations
    /// and on every callback
    assumed_state: Option<PlayerState>,
    synced: bool,
    media: Option<String>,
    media_status: MediaStatus,
    desired: Playback,
    anchor: Option<Anchor>,
    role: Option<Role>,
    roster: Vec<Role>,
    search_results: Vec<SearchResult>,
    classifier: ActionSourceClassifier,
    debouncer: SeekDebouncer,
    compensator: LatencyCompensator,
    /// Advanced by every inbound playback event and by transport loss
    epoch: u64,
    pending_play: Option<u64>,
    scheduled: Option<DeferredPlay>,
    outbox: VecDeque<SyncEvent>,
}

impl<P: Player> ReconciliationEngine<P> {
    pub fn new(features: EngineFeatures) -> Self {
        Self {
            features,
            connection: Connection::Disconnected,
            player: None,
            player_ready: false,
            assumed_state: None,
            synced: false,
            media: None,
            media_status: MediaStatus::Empty,
            desired: Playback::Paused,
            anchor: None,
            role: None,
            roster: Vec::new(),
            search_results: Vec::new(),
            classifier: ActionSourceClassifier::new(),
            debouncer: SeekDebouncer::default(),
            compensator: LatencyCompensator::default(),
            epoch: 0,
            pending_play: None,
            scheduled: None,
            outbox: VecDeque::new(),
        }
    }

    pub fn with_compensator(mut self, compensator: LatencyCompensator) -> Self {
        self.compensator = compensator;
        self
    }

    pub fn with_debouncer(mut self, debouncer: SeekDebouncer) -> Self {
        self.debouncer = debouncer;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> EngineState {
        match self.connection {
            Connection::Disconnected => EngineState::Disconnected,
            Connection::Connecting => EngineState::Connecting,
            Connection::Open => {
                if !self.synced || self.awaiting_player() {
                    EngineState::Syncing
                } else {
                    EngineState::Ready(self.desired)
                }
            }
        }
    }

    /// Desired playback status, independent of connection state
    pub fn playback(&self) -> Playback {
        self.desired
    }

    pub fn media(&self) -> Option<&str> {
        self.media.as_deref()
    }

    pub fn media_status(&self) -> &MediaStatus {
        &self.media_status
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn roster(&self) -> &[Role] {
        &self.roster
    }

    pub fn search_results(&self) -> &[SearchResult] {
        &self.search_results
    }

    /// Authoritative state applied since the channel last opened
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn features(&self) -> EngineFeatures {
        self.features
    }

    pub fn player(&self) -> Option<&P> {
        self.player.as_ref()
    }

    pub fn has_player(&self) -> bool {
        self.player.is_some()
    }

    /// Take the most recently scheduled deferred play, if any
    pub fn take_scheduled(&mut self) -> Option<DeferredPlay> {
        self.scheduled.take()
    }

    /// Drain events waiting to be sent to the authority
    pub fn drain_outbound(&mut self) -> Vec<SyncEvent> {
        self.outbox.drain(..).collect()
    }

    // ========================================================================
    // Capability and transport lifecycle
    // ========================================================================

    /// Hand over the acquired player capability
    pub fn attach_player(&mut self, player: P) {
        info!("Player capability attached");
        self.player = Some(player);
        self.player_ready = false;
        self.assumed_state = None;
        if let MediaStatus::Valid { video_id } = self.media_status.clone() {
            self.load_into_player(&video_id);
        }
    }

    pub fn on_connecting(&mut self) {
        self.connection = Connection::Connecting;
    }

    pub fn on_connected(&mut self) {
        info!("Room channel open, awaiting authoritative state");
        self.connection = Connection::Open;
        self.synced = false;
    }

    /// Transport lost; `retrying` selects Connecting over Disconnected
    pub fn on_disconnected(&mut self, retrying: bool) {
        self.connection = if retrying {
            Connection::Connecting
        } else {
            Connection::Disconnected
        };
        self.synced = false;
        self.advance_epoch();
        self.classifier.disarm();
        self.outbox.clear();
        warn!("Room channel lost (retrying: {}), deferred actions discarded", retrying);
    }

    // ========================================================================
    // Inbound authoritative events
    // ========================================================================

    pub fn handle_event(&mut self, event: SyncEvent, now_ms: i64) {
        debug!("Inbound {}", event.tag());
        match event {
            SyncEvent::RoomUsers(payload) => {
                if self.features.roles {
                    self.roster = payload.users;
                    debug!("Roster updated: {} participants", payload.count);
                }
            }
            SyncEvent::YouAre(payload) => {
                if self.features.roles {
                    info!("Assigned role: {}", payload.role);
                    self.role = Some(payload.role);
                }
            }
            SyncEvent::SyncState(payload) => self.apply_sync_state(payload, now_ms),
            SyncEvent::Play(payload) => self.apply_play(payload, now_ms),
            SyncEvent::Pause => self.apply_pause(now_ms),
            SyncEvent::Seek(payload) => self.apply_seek(payload.time, now_ms),
            SyncEvent::ChangeUrl(payload) => self.apply_change_url(&payload.url, now_ms),
        }
    }

    fn apply_sync_state(&mut self, payload: SyncStatePayload, now_ms: i64) {
        self.advance_epoch();
        if let Some(url) = payload.url.as_deref() {
            self.adopt_media(url);
        }

        let position = payload.seek_to.or_else(|| {
            payload
                .started_at
                .map(|started| millis_to_secs(payload.server_time.unwrap_or(now_ms) - started))
        });
        self.anchor = Some(Anchor {
            playing: payload.is_playing,
            position,
            server_time: payload.server_time,
            received_at: now_ms,
        });
        self.synced = true;
        self.reconcile(now_ms);
    }

    fn apply_play(&mut self, payload: PlayPayload, now_ms: i64) {
        self.advance_epoch();
        let position = payload.seek_to.or_else(|| {
            payload
                .started_at
                .map(|started| millis_to_secs(payload.server_time.unwrap_or(now_ms) - started))
        });
        self.anchor = Some(Anchor {
            playing: true,
            position,
            server_time: payload.server_time,
            received_at: now_ms,
        });
        self.synced = true;
        self.reconcile(now_ms);
    }

    fn apply_pause(&mut self, now_ms: i64) {
        self.advance_epoch();
        self.desired = Playback::Paused;
        self.anchor = Some(Anchor {
            playing: false,
            position: None,
            server_time: None,
            received_at: now_ms,
        });
        if self.player_usable() {
            self.guarded(PlayerState::Paused, true, None);
        } else {
            debug!("PAUSE recorded without player mutation (player not ready)");
        }
    }

    fn apply_seek(&mut self, time: f64, now_ms: i64) {
        let play_was_pending = self.pending_play.is_some();
        self.advance_epoch();
        self.anchor = Some(Anchor {
            playing: self.desired == Playback::Playing,
            position: Some(time),
            server_time: None,
            received_at: now_ms,
        });

        if !self.player_usable() {
            debug!("SEEK recorded without player mutation (player not ready)");
            return;
        }

        // A seek leaves the player in whatever settled state it was in; a
        // pending deferred play has not started it yet
        let settles_to = match self.assumed_state {
            Some(PlayerState::Playing) => PlayerState::Playing,
            Some(PlayerState::Buffering) if !play_was_pending => self.desired.settled_state(),
            _ => PlayerState::Paused,
        };
        self.guarded(settles_to, false, Some(time));

        if play_was_pending && self.desired == Playback::Playing {
            // Override the superseded deferred play with one for this epoch
            self.schedule_play();
        }
    }

    fn apply_change_url(&mut self, url: &str, now_ms: i64) {
        self.advance_epoch();
        let changed = self.adopt_media(url);
        self.reset_to_paused(now_ms);
        self.search_results.clear();

        if !changed && self.player_usable() {
            // Same media re-selected: the authority restarted it paused at zero
            self.guarded(PlayerState::Paused, true, Some(0.0));
        }
    }

    // ========================================================================
    // Player callbacks and deferred actions
    // ========================================================================

    pub fn on_player_event(&mut self, event: PlayerEvent, now_ms: i64) {
        match event {
            PlayerEvent::Ready => self.on_player_ready(now_ms),
            PlayerEvent::StateChange(state) => self.on_player_state(state),
            PlayerEvent::Error(message) => {
                warn!("Player reported error: {}", message);
            }
        }
    }

    fn on_player_ready(&mut self, now_ms: i64) {
        if !self.has_player() {
            return;
        }
        if !matches!(self.media_status, MediaStatus::Valid { .. }) {
            debug!("Player ready with no playable media loaded");
            return;
        }
        info!("Player ready for {:?}", self.media);
        self.player_ready = true;
        self.assumed_state = None;
        if self.synced {
            self.reconcile(now_ms);
        }
    }

    fn on_player_state(&mut self, state: PlayerState) {
        let classification = self.classifier.classify(state);
        match classification {
            Classification::Suppressed { epoch }
                if epoch < self.epoch && self.classifier.outstanding() > 0 =>
            {
                // A newer mutation is still in flight and already set the
                // assumed state
                debug!("{:?} callback from superseded epoch {}", state, epoch);
            }
            _ => self.assumed_state = Some(state),
        }

        match classification {
            Classification::Suppressed { .. } | Classification::Ignored => {}
            Classification::UserPlay => {
                info!("User started playback, relaying PLAY");
                self.desired = Playback::Playing;
                self.outbox.push_back(SyncEvent::play_request());
            }
            Classification::UserPause => {
                info!("User paused playback, relaying PAUSE");
                self.desired = Playback::Paused;
                self.pending_play = None;
                self.outbox.push_back(SyncEvent::Pause);
            }
            Classification::PossibleSeek => {
                let position = match self.player.as_ref().map(|p| p.current_time()) {
                    Some(Ok(position)) => position,
                    Some(Err(e)) => {
                        warn!("Could not read player position: {}", e);
                        return;
                    }
                    None => return,
                };
                if let Some(time) = self.debouncer.observe(position) {
                    info!("User seek to {:.2}s, relaying SEEK", time);
                    self.outbox.push_back(SyncEvent::seek(time));
                }
            }
        }
    }

    /// Fire a deferred play; stale epochs are discarded
    ///
    /// Returns true when the play was issued.
    pub fn on_deferred_play(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.pending_play != Some(epoch) {
            debug!("Discarding stale deferred play (epoch {} vs {})", epoch, self.epoch);
            return false;
        }
        self.pending_play = None;

        if !self.player_usable() || self.desired != Playback::Playing {
            return false;
        }
        if self.assumed_state == Some(PlayerState::Playing) {
            return false;
        }

        self.classifier.arm(epoch);
        self.classifier.expect_settled(PlayerState::Playing);
        let issued = self.play_player();
        if !issued {
            self.classifier.cancel_latest();
        }
        issued
    }

    // ========================================================================
    // Local user operations
    // ========================================================================

    /// User pressed play on the local player
    pub fn user_play(&mut self) {
        self.classifier.note_user_interaction();
        self.play_player();
    }

    /// User pressed pause on the local player
    pub fn user_pause(&mut self) {
        self.classifier.note_user_interaction();
        self.pause_player();
    }

    /// User dragged the scrubber
    pub fn user_seek(&mut self, time: f64) {
        self.classifier.note_user_interaction();
        if let Some(player) = self.player.as_mut() {
            if let Err(e) = player.seek_to(time.max(0.0), true) {
                warn!("Seek failed: {}", e);
            }
        }
    }

    /// User picked a media locator (typed or from search results)
    ///
    /// Adopts it locally right away and queues CHANGE_URL with the
    /// canonical form. Returns the canonical locator, or `None` for blank input.
    pub fn select_media(&mut self, locator: &str, now_ms: i64) -> Option<String> {
        let canonical = media::canonicalize(locator);
        let canonical = canonical.trim();
        if canonical.is_empty() {
            return None;
        }
        let canonical = canonical.to_string();
        self.adopt_media(&canonical);
        self.reset_to_paused(now_ms);
        self.search_results.clear();
        self.outbox.push_back(SyncEvent::change_url(canonical.clone()));
        Some(canonical)
    }

    /// Store catalog search results for selection
    pub fn set_search_results(&mut self, results: Vec<SearchResult>) {
        if self.features.suggestions {
            self.search_results = results;
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn advance_epoch(&mut self) {
        self.epoch += 1;
        self.pending_play = None;
        self.scheduled = None;
    }

    fn awaiting_player(&self) -> bool {
        matches!(self.media_status, MediaStatus::Valid { .. }) && !self.player_ready
    }

    fn player_usable(&self) -> bool {
        self.player.is_some()
            && self.player_ready
            && matches!(self.media_status, MediaStatus::Valid { .. })
    }

    /// Adopt a media locator; returns true when it differs from the current one
    fn adopt_media(&mut self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() || self.media.as_deref() == Some(url) {
            return false;
        }

        self.media = Some(url.to_string());
        self.player_ready = false;
        self.assumed_state = None;
        self.classifier.disarm();
        self.classifier.reset_settled();
        self.debouncer.reset();

        match media::video_id(url) {
            Some(video_id) => {
                info!("Adopting media {} ({})", url, video_id);
                self.media_status = MediaStatus::Valid {
                    video_id: video_id.clone(),
                };
                self.load_into_player(&video_id);
            }
            None => {
                warn!("No playable id in {}, showing invalid media", url);
                self.media_status = MediaStatus::Invalid;
            }
        }
        true
    }

    fn load_into_player(&mut self, video_id: &str) {
        match self.player.as_mut() {
            Some(player) => {
                if let Err(e) = player.load(video_id) {
                    warn!("Failed to load {} into player: {}", video_id, e);
                }
            }
            None => debug!("Player capability not acquired yet, load of {} deferred", video_id),
        }
    }

    fn reset_to_paused(&mut self, now_ms: i64) {
        self.desired = Playback::Paused;
        self.anchor = Some(Anchor {
            playing: false,
            position: Some(0.0),
            server_time: None,
            received_at: now_ms,
        });
    }

    /// Bring the player to the last authoritative anchor
    fn reconcile(&mut self, now_ms: i64) {
        let Some(anchor) = self.anchor else {
            return;
        };
        self.desired = if anchor.playing {
            Playback::Playing
        } else {
            Playback::Paused
        };

        if !self.player_usable() {
            debug!("Anchor recorded; player not ready, reconciliation deferred");
            return;
        }

        if anchor.playing {
            // Position as of now: compensated at receipt plus local time since
            let target = anchor.position.map(|position| {
                self.compensator
                    .compensate(position, anchor.server_time, anchor.received_at)
                    + millis_to_secs((now_ms - anchor.received_at).max(0))
            });
            self.guarded(PlayerState::Paused, true, target);
            self.schedule_play();
        } else {
            self.guarded(PlayerState::Paused, true, anchor.position);
        }
    }

    /// Pause (if running) and/or seek behind the guard
    ///
    /// The guard is armed only when a mutation is actually issued, so no
    /// guard is left waiting for a callback that will never come.
    fn guarded(&mut self, settles_to: PlayerState, pause: bool, seek: Option<f64>) {
        let pause = pause && self.player_may_be_running();
        if !pause && seek.is_none() {
            return;
        }

        self.classifier.arm(self.epoch);
        self.classifier.expect_settled(settles_to);
        let mut issued = pause && self.pause_player();
        if let Some(target) = seek {
            issued |= self.seek_player(target);
        }
        if !issued {
            self.classifier.cancel_latest();
        }
    }

    fn player_may_be_running(&self) -> bool {
        matches!(
            self.assumed_state,
            Some(PlayerState::Playing) | Some(PlayerState::Buffering)
        )
    }

    fn schedule_play(&mut self) {
        let deferred = DeferredPlay {
            epoch: self.epoch,
            delay: self.compensator.buffer_delay(),
        };
        self.pending_play = Some(deferred.epoch);
        self.scheduled = Some(deferred);
    }

    fn pause_player(&mut self) -> bool {
        let issued = self.with_player("pause", |player| player.pause());
        if issued {
            self.assumed_state = Some(PlayerState::Paused);
        }
        issued
    }

    fn play_player(&mut self) -> bool {
        let issued = self.with_player("play", |player| player.play());
        if issued {
            self.assumed_state = Some(PlayerState::Playing);
        }
        issued
    }

    fn seek_player(&mut self, seconds: f64) -> bool {
        let seconds = seconds.max(0.0);
        self.with_player("seek", |player| player.seek_to(seconds, true))
    }

    /// Run one player mutation; failures are logged, never fatal
    fn with_player<F>(&mut self, operation: &str, f: F) -> bool
    where
        F: FnOnce(&mut P) -> Result<()>,
    {
        let Some(player) = self.player.as_mut() else {
            debug!("No player handle, {} skipped", operation);
            return false;
        };
        match f(player) {
            Ok(()) => true,
            Err(e) => {
                warn!("Player {} failed: {}", operation, e);
                false
            }
        }
    }
}
