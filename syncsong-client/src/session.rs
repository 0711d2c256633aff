//! Session driver
//!
//! Owns the [`ReconciliationEngine`] and feeds it from every asynchronous
//! source, one event at a time:
//! - room channel frames
//! - player callbacks
//! - the single deferred-play timer
//! - local user commands and finished catalog searches
//!
//! The driver also acquires the player capability (once), flushes the
//! engine's outbound events, and reconnects with bounded exponential backoff
//! when the room channel drops.

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use syncsong_common::api::SearchResult;
use syncsong_common::config::ClientConfig;
use syncsong_common::media::looks_like_url;
use syncsong_common::time::now_millis;
use syncsong_common::Role;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Sleep};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::backoff::Backoff;
use crate::engine::{EngineFeatures, EngineState, ReconciliationEngine};
use crate::error::{Error, Result};
use crate::lobby::LobbyClient;
use crate::player::{PlayerEvent, PlayerEvents, PlayerProvider};
use crate::transport::{self, RoomReceiver, RoomSender};

/// Local user intent
#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    Play,
    Pause,
    Seek(f64),
    /// Locator typed by the user
    ChangeMedia(String),
    /// Free text: a locator is selected directly, anything else is searched
    Search(String),
    /// Pick an entry from the last search results
    SelectResult(usize),
    Leave,
}

/// Snapshot published after every processed event
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: EngineState,
    pub media: Option<String>,
    pub role: Option<Role>,
    pub participants: usize,
    pub search_results: Vec<SearchResult>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: EngineState::Disconnected,
            media: None,
            role: None,
            participants: 0,
            search_results: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub server_url: String,
    pub room_code: String,
    pub features: EngineFeatures,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub max_reconnect_attempts: u32,
}

impl SessionConfig {
    pub fn from_client_config(config: &ClientConfig, room_code: &str) -> Self {
        Self {
            server_url: config.server_url.clone(),
            room_code: room_code.to_string(),
            features: EngineFeatures::default(),
            reconnect_base: Duration::from_millis(config.reconnect_base_ms),
            reconnect_max: Duration::from_millis(config.reconnect_max_ms),
            max_reconnect_attempts: config.max_reconnect_attempts,
        }
    }
}

/// Control side of a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<UserCommand>,
    status: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    pub fn send(&self, command: UserCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Transport("session has ended".to_string()))
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Wait until the published status satisfies `predicate`
    pub async fn wait_for<F>(&self, predicate: F) -> Result<SessionStatus>
    where
        F: FnMut(&SessionStatus) -> bool,
    {
        let mut status = self.status.clone();
        let matched = status
            .wait_for(predicate)
            .await
            .map_err(|_| Error::Transport("session has ended".to_string()))?;
        Ok(matched.clone())
    }
}

type Deferred = Option<(u64, Pin<Box<Sleep>>)>;

pub struct SessionDriver<Prov: PlayerProvider> {
    config: SessionConfig,
    provider: Option<Prov>,
    engine: ReconciliationEngine<Prov::Handle>,
    commands: mpsc::UnboundedReceiver<UserCommand>,
    status: watch::Sender<SessionStatus>,
}

impl<Prov> SessionDriver<Prov>
where
    Prov: PlayerProvider + 'static,
{
    pub fn new(config: SessionConfig, provider: Prov) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let engine = ReconciliationEngine::new(config.features);
        let driver = Self {
            config,
            provider: Some(provider),
            engine,
            commands: command_rx,
            status: status_tx,
        };
        let handle = SessionHandle {
            commands: command_tx,
            status: status_rx,
        };
        (driver, handle)
    }

    /// Run until the user leaves (`Ok`) or reconnecting gives up
    /// (`Err(Error::Disconnected)`)
    pub async fn run(mut self) -> Result<()> {
        let endpoint = transport::room_endpoint(&self.config.server_url, &self.config.room_code)?;
        let lobby = LobbyClient::new(&self.config.server_url)?;
        let mut backoff = Backoff::new(
            self.config.reconnect_base,
            self.config.reconnect_max,
            self.config.max_reconnect_attempts,
        );

        let provider = self
            .provider
            .take()
            .ok_or_else(|| Error::Player("player provider already used".to_string()))?;
        let mut acquisition = provider.acquire();
        let mut acquiring = true;
        let mut player_events: Option<PlayerEvents> = None;

        let (search_tx, mut search_rx) = mpsc::unbounded_channel::<Vec<SearchResult>>();

        let mut sender: Option<RoomSender> = None;
        let mut receiver: Option<RoomReceiver> = None;
        let mut deferred: Deferred = None;
        let mut retry: Option<Pin<Box<Sleep>>> = Some(Box::pin(sleep(Duration::ZERO)));

        info!("Joining room {} via {}", self.config.room_code, endpoint);
        self.engine.on_connecting();

        loop {
            self.publish_status();

            tokio::select! {
                biased;

                acquired = &mut acquisition, if acquiring => {
                    acquiring = false;
                    match acquired {
                        Ok((player, events)) => {
                            self.engine.attach_player(player);
                            player_events = Some(events);
                        }
                        Err(e) => error!("Player capability unavailable: {}", e),
                    }
                }

                event = next_player_event(&mut player_events) => match event {
                    Some(event) => self.engine.on_player_event(event, now_millis()),
                    None => {
                        warn!("Player callback channel closed");
                        player_events = None;
                    }
                },

                frame = next_frame(&mut receiver) => match frame {
                    Ok(Some(event)) => {
                        self.engine.handle_event(event, now_millis());
                        // An accepted upgrade alone does not count as recovery
                        if self.engine.is_synced() && backoff.attempts() > 0 {
                            debug!("Authoritative state applied, reconnect backoff reset");
                            backoff.reset();
                        }
                    }
                    Ok(None) => {
                        info!("Room channel closed by authority");
                        sender = None;
                        receiver = None;
                        deferred = None;
                        retry = Some(self.link_lost(&mut backoff)?);
                    }
                    Err(e) => {
                        warn!("Room channel failed: {}", e);
                        sender = None;
                        receiver = None;
                        deferred = None;
                        retry = Some(self.link_lost(&mut backoff)?);
                    }
                },

                epoch = fire_deferred(&mut deferred) => {
                    deferred = None;
                    self.engine.on_deferred_play(epoch);
                }

                Some(results) = search_rx.recv() => {
                    self.engine.set_search_results(results);
                }

                command = self.commands.recv() => {
                    let command = command.unwrap_or(UserCommand::Leave);
                    if command == UserCommand::Leave {
                        info!("Leaving room {}", self.config.room_code);
                        if let Some(sender) = sender.as_mut() {
                            sender.close().await;
                        }
                        self.engine.on_disconnected(false);
                        self.publish_status();
                        return Ok(());
                    }
                    self.apply_command(command, &lobby, &search_tx);
                }

                _ = fire_retry(&mut retry) => {
                    retry = None;
                    match transport::connect(&endpoint).await {
                        Ok((tx, rx)) => {
                            info!("Connected to room {}", self.config.room_code);
                            sender = Some(tx);
                            receiver = Some(rx);
                            self.engine.on_connected();
                        }
                        Err(e) => {
                            warn!("{}", e);
                            retry = Some(self.link_lost(&mut backoff)?);
                        }
                    }
                }
            }

            if let Some(scheduled) = self.engine.take_scheduled() {
                debug!(
                    "Deferred play in {:?} (epoch {})",
                    scheduled.delay, scheduled.epoch
                );
                deferred = Some((scheduled.epoch, Box::pin(sleep(scheduled.delay))));
            }

            let outbound = self.engine.drain_outbound();
            match sender.as_mut() {
                Some(sender) => {
                    for event in outbound {
                        if let Err(e) = sender.send(&event).await {
                            warn!("Dropping outbound {}: {}", event.tag(), e);
                        }
                    }
                }
                None if !outbound.is_empty() => {
                    debug!("Not connected, dropping {} outbound events", outbound.len());
                }
                None => {}
            }
        }
    }

    fn apply_command(
        &mut self,
        command: UserCommand,
        lobby: &LobbyClient,
        search_tx: &mpsc::UnboundedSender<Vec<SearchResult>>,
    ) {
        debug!("User command {:?}", command);
        match command {
            UserCommand::Play => self.engine.user_play(),
            UserCommand::Pause => self.engine.user_pause(),
            UserCommand::Seek(time) => self.engine.user_seek(time),
            UserCommand::ChangeMedia(locator) => {
                self.engine.select_media(&locator, now_millis());
            }
            UserCommand::Search(text) => {
                if looks_like_url(&text) {
                    self.engine.select_media(&text, now_millis());
                } else if self.engine.features().suggestions {
                    let lobby = lobby.clone();
                    let search_tx = search_tx.clone();
                    tokio::spawn(async move {
                        let results = lobby.search(&text).await;
                        let _ = search_tx.send(results);
                    });
                }
            }
            UserCommand::SelectResult(index) => {
                let url = self
                    .engine
                    .search_results()
                    .get(index)
                    .map(|result| result.url.clone());
                match url {
                    Some(url) => {
                        self.engine.select_media(&url, now_millis());
                    }
                    None => warn!("No search result #{}", index),
                }
            }
            UserCommand::Leave => {}
        }
    }

    /// Schedule the next reconnect, or give up at the ceiling
    fn link_lost(&mut self, backoff: &mut Backoff) -> Result<Pin<Box<Sleep>>> {
        match backoff.next_delay() {
            Some(delay) => {
                self.engine.on_disconnected(true);
                info!(
                    "Reconnecting in {:?} (attempt {})",
                    delay,
                    backoff.attempts()
                );
                Ok(Box::pin(sleep(delay)))
            }
            None => {
                self.engine.on_disconnected(false);
                self.publish_status();
                error!("Giving up after {} reconnect attempts", backoff.attempts());
                Err(Error::Disconnected {
                    attempts: backoff.attempts(),
                })
            }
        }
    }

    fn publish_status(&self) {
        let next = SessionStatus {
            state: self.engine.state(),
            media: self.engine.media().map(str::to_string),
            role: self.engine.role(),
            participants: self.engine.roster().len(),
            search_results: self.engine.search_results().to_vec(),
        };
        self.status.send_if_modified(|current| {
            if *current != next {
                *current = next;
                true
            } else {
                false
            }
        });
    }
}

/// Endpoint the session connects to, for display
pub fn session_endpoint(config: &SessionConfig) -> Result<Url> {
    transport::room_endpoint(&config.server_url, &config.room_code)
}

async fn next_player_event(events: &mut Option<PlayerEvents>) -> Option<PlayerEvent> {
    match events {
        Some(events) => events.recv().await,
        None => pending().await,
    }
}

async fn next_frame(
    receiver: &mut Option<RoomReceiver>,
) -> Result<Option<syncsong_common::SyncEvent>> {
    match receiver {
        Some(receiver) => receiver.next_event().await,
        None => pending().await,
    }
}

async fn fire_deferred(deferred: &mut Deferred) -> u64 {
    match deferred {
        Some((epoch, timer)) => {
            timer.as_mut().await;
            *epoch
        }
        None => pending().await,
    }
}

async fn fire_retry(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}
