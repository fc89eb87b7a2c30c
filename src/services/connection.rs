use crate::fanout::SubscriptionGuard;
use crate::models::fanout::channel;
use crate::models::{DeviceFamily, FanoutMessage};
use crate::protocol::{self, JoinResponse, LanternMessage, MatrxMessage};
use crate::router;
use crate::services::outbound::DeviceSender;
use crate::state::AppState;
use anyhow::Context;
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How long teardown waits for the writer to flush a shutdown close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// One live socket bound to a device.
#[derive(Debug)]
pub struct Session {
    pub device_id: String,
    pub family: DeviceFamily,
    pub session_id: Uuid,
    pub sender: DeviceSender,
}

impl Session {
    pub async fn send_matrx(&self, message: protocol::matrx_message::Message) -> bool {
        self.sender.send(&MatrxMessage::from(message)).await
    }

    pub async fn send_lantern(&self, message: protocol::lantern_message::Message) -> bool {
        self.sender.send(&LanternMessage::from(message)).await
    }
}

struct SessionEntry {
    session_id: Uuid,
    connected_at: DateTime<Utc>,
    _subscription: SubscriptionGuard,
}

/// Registry of the devices connected to this process.
///
/// Holds at most one entry per device id. The entry owns the device's fanout
/// subscription, so replacing or removing it unsubscribes.
#[derive(Default)]
pub struct ConnectionManager {
    sessions: DashMap<String, SessionEntry>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `session_id` to the device, evicting any earlier session.
    pub fn register(&self, device_id: &str, session_id: Uuid, subscription: SubscriptionGuard) {
        let entry = SessionEntry {
            session_id,
            connected_at: Utc::now(),
            _subscription: subscription,
        };
        if let Some(previous) = self.sessions.insert(device_id.to_string(), entry) {
            tracing::info!(
                device_id,
                evicted_session = %previous.session_id,
                connected_at = %previous.connected_at,
                "replaced existing session"
            );
        }
    }

    /// Drops whatever session the device holds, unsubscribing its fanout.
    pub fn evict(&self, device_id: &str) -> Option<Uuid> {
        let (_, previous) = self.sessions.remove(device_id)?;
        tracing::info!(
            device_id,
            evicted_session = %previous.session_id,
            connected_at = %previous.connected_at,
            "evicted existing session"
        );
        Some(previous.session_id)
    }

    /// Removes the registration only if it still belongs to `session_id`.
    pub fn release(&self, device_id: &str, session_id: Uuid) -> bool {
        self.sessions
            .remove_if(device_id, |_, entry| entry.session_id == session_id)
            .is_some()
    }

    pub fn is_current(&self, device_id: &str, session_id: Uuid) -> bool {
        self.sessions
            .get(device_id)
            .is_some_and(|entry| entry.session_id == session_id)
    }

    pub fn connected_devices(&self) -> usize {
        self.sessions.len()
    }
}

/// Runs the bootstrap sequence for a freshly accepted socket.
///
/// Upserts the device, drops any earlier session's subscription before
/// subscribing anew, registers the session, then sends the join response and
/// (for Matrx) the stored config.
pub async fn open_session(
    state: &AppState,
    device_id: &str,
    family: DeviceFamily,
    sender: DeviceSender,
) -> anyhow::Result<Arc<Session>> {
    match state.store.get_device(device_id).await {
        Ok(Some(device)) => tracing::info!(
            device_id,
            was_online = device.is_online(Utc::now()),
            last_seen_at = %device.last_seen_at,
            "known device connecting"
        ),
        Ok(None) => tracing::info!(device_id, "first connection from device"),
        Err(err) => tracing::warn!(device_id, "failed to look up device: {}", err),
    }
    state
        .store
        .upsert_device(device_id, family)
        .await
        .with_context(|| format!("Failed to upsert device {}", device_id))?;
    state.connections.evict(device_id);
    let (receiver, guard) = state
        .fanout
        .subscribe(&channel(device_id))
        .await
        .with_context(|| format!("Failed to subscribe fanout for {}", device_id))?
        .into_parts();
    let session = Arc::new(Session {
        device_id: device_id.to_string(),
        family,
        session_id: Uuid::new_v4(),
        sender,
    });
    state
        .connections
        .register(device_id, session.session_id, guard);
    spawn_forwarder(state.clone(), session.clone(), receiver);

    let bootstrap = async {
        let owner = state
            .store
            .find_owner_claim(device_id)
            .await
            .context("Failed to look up device owner")?;
        let join = JoinResponse::new(true, owner.is_some());
        match family {
            DeviceFamily::Matrx => {
                session
                    .send_matrx(protocol::matrx_message::Message::JoinResponse(join))
                    .await;
                let config = router::matrx::device_config_message(state, device_id)
                    .await
                    .context("Failed to load device config")?;
                session.send_matrx(config).await;
            }
            DeviceFamily::Lantern => {
                session
                    .send_lantern(protocol::lantern_message::Message::JoinResponse(join))
                    .await;
            }
        }
        anyhow::Ok(())
    };
    if let Err(err) = bootstrap.await {
        state.connections.release(device_id, session.session_id);
        return Err(err);
    }
    Ok(session)
}

/// Pushes fanout payloads for the session's device through its router.
///
/// Ends when the subscription is dropped, i.e. on teardown or eviction.
fn spawn_forwarder(state: AppState, session: Arc<Session>, mut receiver: mpsc::Receiver<String>) {
    tokio::spawn(async move {
        while let Some(payload) = receiver.recv().await {
            let message = match FanoutMessage::parse(&payload) {
                Ok(message) => message,
                Err(err) => {
                    tracing::warn!(
                        device_id = %session.device_id,
                        "ignoring malformed fanout payload: {}",
                        err
                    );
                    continue;
                }
            };
            if !state
                .connections
                .is_current(&session.device_id, session.session_id)
            {
                break;
            }
            if session.sender.is_closed() {
                tracing::debug!(device_id = %session.device_id, "socket closed, fanout dropped");
                continue;
            }
            if let Err(err) = router::handle_fanout(&state, &session, message).await {
                tracing::error!(
                    device_id = %session.device_id,
                    "fanout handler failed: {:?}",
                    err
                );
            }
        }
        tracing::debug!(device_id = %session.device_id, session_id = %session.session_id, "fanout forwarder stopped");
    });
}

/// Drives one device socket from bootstrap to teardown.
pub async fn serve_socket(
    state: AppState,
    socket: WebSocket,
    device_id: String,
    family: DeviceFamily,
) {
    let (ws_sender, ws_receiver) = socket.split();
    drive_socket(state, ws_sender, ws_receiver, device_id, family).await;
}

async fn drive_socket<W, R, E>(
    state: AppState,
    mut ws_sender: W,
    mut ws_receiver: R,
    device_id: String,
    family: DeviceFamily,
) where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display + Send,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (sender, mut outbound) = DeviceSender::channel();
    let abort = CancellationToken::new();
    let mut writer = {
        let abort = abort.clone();
        let shutdown = state.shutdown_signal.clone();
        tokio::spawn(async move {
            loop {
                let close = tokio::select! {
                    frame = outbound.recv() => match frame {
                        Some(frame) => {
                            if let Err(err) = ws_sender.send(Message::Binary(frame.into())).await {
                                tracing::debug!("socket write failed: {}", err);
                                break;
                            }
                            continue;
                        }
                        None => break,
                    },
                    _ = abort.cancelled() => CloseFrame {
                        code: close_code::ERROR,
                        reason: "bootstrap failed".into(),
                    },
                    _ = shutdown.cancelled() => CloseFrame {
                        code: close_code::AWAY,
                        reason: "Server shutting down".into(),
                    },
                };
                let _ = ws_sender.send(Message::Close(Some(close))).await;
                break;
            }
        })
    };

    // `sender` outlives the session so the writer only stops on a close path
    let session = match open_session(&state, &device_id, family, sender.clone()).await {
        Ok(session) => session,
        Err(err) => {
            tracing::error!("device bootstrap failed: {:?}", err);
            abort.cancel();
            let _ = writer.await;
            return;
        }
    };
    tracing::info!(session_id = %session.session_id, "device connected");

    loop {
        let message = tokio::select! {
            message = ws_receiver.next() => message,
            _ = state.shutdown_signal.cancelled() => None,
        };
        let Some(message) = message else {
            break;
        };
        match message {
            Ok(Message::Binary(frame)) => {
                let state = state.clone();
                let session = session.clone();
                tokio::spawn(async move {
                    if let Err(err) = router::handle_frame(&state, &session, &frame).await {
                        tracing::error!(
                            device_id = %session.device_id,
                            "frame handler failed: {:?}",
                            err
                        );
                    }
                });
            }
            Ok(Message::Ping(_)) => {
                if let Err(err) = state.store.touch_device(&device_id).await {
                    tracing::warn!("failed to refresh last seen: {}", err);
                }
            }
            Ok(Message::Text(_)) => {
                tracing::debug!("ignoring text frame");
            }
            Ok(Message::Pong(_)) => {}
            Ok(Message::Close(frame)) => {
                tracing::debug!(?frame, "device closed socket");
                break;
            }
            Err(err) => {
                tracing::warn!("socket read failed: {}", err);
                break;
            }
        }
    }

    if !state.connections.release(&device_id, session.session_id) {
        tracing::debug!(session_id = %session.session_id, "session was already replaced");
    }
    drop(session);
    if state.shutdown_signal.is_cancelled()
        && tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err()
    {
        tracing::debug!("close frame not flushed before shutdown");
    }
    writer.abort();
    drop(sender);
    tracing::info!("device disconnected");
}
