//! End-to-end: two session drivers against a loopback authority

use std::sync::Arc;
use std::time::Duration;

use syncsong_client::error::Error;
use syncsong_client::lobby::LobbyClient;
use syncsong_client::session::{SessionConfig, SessionDriver, SessionHandle, SessionStatus, UserCommand};
use syncsong_client::sim_player::{SimClock, SimulatedPlayerProvider};
use syncsong_client::{EngineFeatures, EngineState, Playback};
use syncsong_common::Role;
use syncsong_server::api::{self, AppContext};
use syncsong_server::catalog::NullCatalog;
use syncsong_server::registry::RoomRegistry;

const SHORT_LINK: &str = "https://youtu.be/dQw4w9WgXcQ";
const CANONICAL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

async fn start_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let ctx = AppContext::new(Arc::new(RoomRegistry::new()), Arc::new(NullCatalog));
    tokio::spawn(api::run(listener, ctx, std::future::pending()));
    format!("http://{}", addr)
}

fn session_config(server_url: &str, room_code: &str, max_attempts: u32) -> SessionConfig {
    SessionConfig {
        server_url: server_url.to_string(),
        room_code: room_code.to_string(),
        features: EngineFeatures::default(),
        reconnect_base: Duration::from_millis(20),
        reconnect_max: Duration::from_millis(100),
        max_reconnect_attempts: max_attempts,
    }
}

async fn wait(handle: &SessionHandle, predicate: impl FnMut(&SessionStatus) -> bool) -> SessionStatus {
    tokio::time::timeout(Duration::from_secs(5), handle.wait_for(predicate))
        .await
        .expect("timed out waiting for session status")
        .expect("session ended")
}

#[tokio::test]
async fn test_two_sessions_play_together() {
    let base = start_server().await;
    let lobby = LobbyClient::new(&base).unwrap();
    let code = lobby.create_new_room().await.unwrap();
    assert!(lobby.room_exists(&code).await.unwrap());

    let provider = SimulatedPlayerProvider::new(SimClock::System);
    let (driver_a, a) = SessionDriver::new(session_config(&base, &code, 3), provider);
    let task_a = tokio::spawn(driver_a.run());
    wait(&a, |s| {
        s.state == EngineState::Ready(Playback::Paused) && s.role == Some(Role::Admin)
    })
    .await;

    a.send(UserCommand::ChangeMedia(SHORT_LINK.to_string())).unwrap();
    wait(&a, |s| {
        s.media.as_deref() == Some(CANONICAL) && s.state == EngineState::Ready(Playback::Paused)
    })
    .await;

    let provider = SimulatedPlayerProvider::new(SimClock::System).with_delay(Duration::from_millis(30));
    let (driver_b, b) = SessionDriver::new(session_config(&base, &code, 3), provider);
    let task_b = tokio::spawn(driver_b.run());
    let joined = wait(&b, |s| {
        s.media.as_deref() == Some(CANONICAL) && s.state == EngineState::Ready(Playback::Paused)
    })
    .await;
    assert_eq!(joined.role, Some(Role::Member));
    wait(&a, |s| s.participants == 2).await;

    a.send(UserCommand::Play).unwrap();
    wait(&a, |s| s.state == EngineState::Ready(Playback::Playing)).await;
    wait(&b, |s| s.state == EngineState::Ready(Playback::Playing)).await;
    // Let the deferred plays fire so the players are actually running
    tokio::time::sleep(Duration::from_millis(400)).await;

    b.send(UserCommand::Pause).unwrap();
    wait(&a, |s| s.state == EngineState::Ready(Playback::Paused)).await;

    a.send(UserCommand::Leave).unwrap();
    b.send(UserCommand::Leave).unwrap();
    assert!(task_a.await.unwrap().is_ok());
    assert!(task_b.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_gives_up_after_retry_ceiling() {
    // Reserve a port, then free it so nothing is listening
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let provider = SimulatedPlayerProvider::new(SimClock::System);
    let (driver, handle) =
        SessionDriver::new(session_config(&format!("http://{}", addr), "NOBODY", 2), provider);

    let result = tokio::time::timeout(Duration::from_secs(5), driver.run())
        .await
        .expect("driver should give up");
    assert!(matches!(result, Err(Error::Disconnected { attempts: 2 })));
    assert_eq!(handle.status().state, EngineState::Disconnected);
}

#[tokio::test]
async fn test_gives_up_when_authority_drops_every_channel() {
    // Accepts the upgrade, then hangs up before sending any state
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(socket) = tokio_tungstenite::accept_async(stream).await {
                drop(socket);
            }
        }
    });

    let provider = SimulatedPlayerProvider::new(SimClock::System);
    let (driver, handle) =
        SessionDriver::new(session_config(&format!("http://{}", addr), "FLAKY1", 3), provider);

    let result = tokio::time::timeout(Duration::from_secs(5), driver.run())
        .await
        .expect("driver should give up");
    assert!(matches!(result, Err(Error::Disconnected { attempts: 3 })));
    assert_eq!(handle.status().state, EngineState::Disconnected);
}
