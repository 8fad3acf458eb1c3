//! Persistent session with the control surface.
//!
//! One background task owns the WebSocket for its whole lifetime: it
//! connects, performs the `Hello`/`Identify` handshake, primes the scene
//! cache, serves commands, and on any transport failure re-enters the
//! backoff schedule. Everything else talks to the task through channels,
//! so connection state transitions stay serialized in one place.
//!
//! Commands are never queued across a disconnect: only the current focus
//! state matters, so anything pending when the connection drops is failed
//! immediately and the next real focus change re-triggers correctly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Notify, RwLock};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use protocol::{
    authentication_string, close_code, status, ClientMessage, Identify, Request, RequestResponse,
    ServerMessage,
};

use super::backoff::Backoff;
use super::{CommandError, ConnectionError, ConnectionState, ControlTarget, SessionOptions};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Correlation id sequence for RPC requests.
static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> String {
    format!("req-{}", REQUEST_SEQ.fetch_add(1, Ordering::Relaxed))
}

/// A command travelling from `send_command` to the connection task.
struct CommandEnvelope {
    scene: String,
    reply: oneshot::Sender<Result<(), CommandError>>,
}

/// State shared between the session handle and the connection task.
struct Shared {
    target: RwLock<ControlTarget>,
    state_tx: watch::Sender<ConnectionState>,
    reconnect_attempts: AtomicU64,
    scenes: RwLock<Vec<String>>,
    reconnect_now: Notify,
}

/// Handle to the control surface session.
pub struct RemoteSession {
    shared: Arc<Shared>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    options: SessionOptions,
}

impl RemoteSession {
    /// Spawns the connection task and returns a handle to it.
    ///
    /// Connecting happens in the background; the daemon comes up even when
    /// the surface is offline. The task runs until `shutdown` is cancelled.
    pub fn spawn(
        target: ControlTarget,
        options: SessionOptions,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (command_tx, command_rx) = mpsc::channel(8);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        let shared = Arc::new(Shared {
            target: RwLock::new(target),
            state_tx,
            reconnect_attempts: AtomicU64::new(0),
            scenes: RwLock::new(Vec::new()),
            reconnect_now: Notify::new(),
        });

        tokio::spawn(connection_loop(
            Arc::clone(&shared),
            options.clone(),
            shutdown,
            command_rx,
        ));

        Arc::new(Self {
            shared,
            command_tx,
            options,
        })
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Read-only signal of connection state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Number of failed connection attempts since startup.
    pub fn reconnect_attempts(&self) -> u64 {
        self.shared.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Scene names the surface reported, as of the last refresh.
    pub async fn known_scenes(&self) -> Vec<String> {
        self.shared.scenes.read().await.clone()
    }

    /// Swaps the connection target and forces a reconnect if it changed.
    ///
    /// Called by the orchestrator when a configuration reload touches the
    /// `[control]` section.
    pub async fn update_target(&self, target: ControlTarget) {
        let mut current = self.shared.target.write().await;
        if *current == target {
            return;
        }
        info!(
            host = %target.host,
            port = target.port,
            "Control surface target changed, reconnecting"
        );
        *current = target;
        drop(current);
        self.shared.reconnect_now.notify_one();
    }

    /// Switches the surface to the named scene.
    ///
    /// Valid only while `Connected`; in every other state this fails fast
    /// with [`CommandError::NotConnected`] rather than waiting for the next
    /// reconnect attempt.
    pub async fn send_command(&self, scene: &str) -> Result<(), CommandError> {
        if self.state() != ConnectionState::Connected {
            return Err(CommandError::NotConnected);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = CommandEnvelope {
            scene: scene.to_string(),
            reply: reply_tx,
        };

        self.command_tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => CommandError::TransportFailure,
            mpsc::error::TrySendError::Closed(_) => CommandError::NotConnected,
        })?;

        match tokio::time::timeout(self.options.command_timeout, reply_rx).await {
            Err(_) => Err(CommandError::Timeout),
            // Envelope dropped with the connection.
            Ok(Err(_)) => Err(CommandError::TransportFailure),
            Ok(Ok(result)) => result,
        }
    }
}

/// Why the serve phase ended.
enum ServeExit {
    Shutdown,
    TargetChanged,
    ConnectionLost,
}

async fn connection_loop(
    shared: Arc<Shared>,
    options: SessionOptions,
    shutdown: CancellationToken,
    mut command_rx: mpsc::Receiver<CommandEnvelope>,
) {
    let mut backoff = Backoff::new(options.backoff_base, options.backoff_cap);
    let mut first_attempt = true;

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let delay = backoff.next_delay(&mut rand::thread_rng());
        if first_attempt {
            set_state(&shared, ConnectionState::Connecting);
        } else {
            set_state(&shared, ConnectionState::Reconnecting);
        }
        first_attempt = false;

        // Commands that raced in while we were serving are stale now.
        drain_stale(&mut command_rx);

        if !delay.is_zero() {
            debug!(delay = ?delay, "Waiting before reconnection attempt");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = shared.reconnect_now.notified() => {
                    // Target changed mid-wait; retry right away.
                    backoff.reset();
                    continue;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let target = shared.target.read().await.clone();
        let established =
            tokio::time::timeout(options.connect_timeout, establish(&target, &options)).await;

        let (ws, scenes) = match established {
            Err(_) => {
                attempt_failed(&shared, &ConnectionError::Timeout);
                continue;
            }
            Ok(Err(e)) => {
                attempt_failed(&shared, &e);
                continue;
            }
            Ok(Ok(established)) => established,
        };

        info!(
            host = %target.host,
            port = target.port,
            scenes = scenes.len(),
            "Connected to control surface"
        );

        *shared.scenes.write().await = scenes;
        backoff.reset();
        drain_stale(&mut command_rx);
        set_state(&shared, ConnectionState::Connected);

        match serve(ws, &shared, &options, &mut command_rx, &shutdown).await {
            ServeExit::Shutdown => break,
            ServeExit::TargetChanged => {}
            ServeExit::ConnectionLost => {
                warn!("Connection to control surface lost");
            }
        }
    }

    set_state(&shared, ConnectionState::Disconnected);
    debug!("Control surface connection loop stopped");
}

fn set_state(shared: &Shared, new: ConnectionState) {
    let changed = shared.state_tx.send_if_modified(|state| {
        if *state == new {
            false
        } else {
            *state = new;
            true
        }
    });
    if changed {
        debug!(state = ?new, "Connection state changed");
    }
}

fn attempt_failed(shared: &Shared, error: &ConnectionError) {
    let attempts = shared.reconnect_attempts.fetch_add(1, Ordering::Relaxed) + 1;
    warn!(error = %error, attempts, "Connection attempt failed");
}

fn drain_stale(command_rx: &mut mpsc::Receiver<CommandEnvelope>) {
    while let Ok(envelope) = command_rx.try_recv() {
        let _ = envelope.reply.send(Err(CommandError::NotConnected));
    }
}

/// Connects, handshakes, authenticates and primes the scene cache.
async fn establish(
    target: &ControlTarget,
    options: &SessionOptions,
) -> Result<(Ws, Vec<String>), ConnectionError> {
    let url = Url::parse(&target.url())
        .map_err(|e| ConnectionError::HandshakeFailed(format!("invalid control url: {}", e)))?;

    let (mut ws, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| ConnectionError::Unreachable(e.to_string()))?;

    let hello = match next_server_message(&mut ws).await? {
        ServerMessage::Hello(hello) => hello,
        other => {
            return Err(ConnectionError::HandshakeFailed(format!(
                "expected Hello, got {:?}",
                other
            )))
        }
    };

    let authentication = hello
        .authentication
        .as_ref()
        .map(|challenge| authentication_string(&target.password, &challenge.salt, &challenge.challenge));

    send_client(&mut ws, &ClientMessage::Identify(Identify::new(authentication))).await?;

    match next_server_message(&mut ws).await? {
        ServerMessage::Identified(identified) => {
            debug!(
                rpc_version = identified.negotiated_rpc_version,
                "Session identified"
            );
        }
        other => {
            return Err(ConnectionError::HandshakeFailed(format!(
                "expected Identified, got {:?}",
                other
            )))
        }
    }

    let scenes = fetch_scene_list(&mut ws, options).await?;
    Ok((ws, scenes))
}

async fn fetch_scene_list(
    ws: &mut Ws,
    options: &SessionOptions,
) -> Result<Vec<String>, ConnectionError> {
    let request = Request::get_scene_list(next_request_id());
    let response = roundtrip(ws, request, options)
        .await
        .map_err(|e| match e {
            RoundtripError::Timeout => ConnectionError::Timeout,
            RoundtripError::Transport(msg) => ConnectionError::Unreachable(msg),
        })?;

    if !response.is_success() {
        return Err(ConnectionError::HandshakeFailed(format!(
            "scene list request rejected with code {}",
            response.request_status.code
        )));
    }

    let list = response
        .scene_list()
        .map_err(|e| ConnectionError::HandshakeFailed(e.to_string()))?;
    Ok(list.scene_names())
}

/// Serves commands over an established session until it ends.
async fn serve(
    mut ws: Ws,
    shared: &Shared,
    options: &SessionOptions,
    command_rx: &mut mpsc::Receiver<CommandEnvelope>,
    shutdown: &CancellationToken,
) -> ServeExit {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = ws.close(None).await;
                return ServeExit::Shutdown;
            }
            _ = shared.reconnect_now.notified() => {
                let _ = ws.close(None).await;
                return ServeExit::TargetChanged;
            }
            incoming = ws.next() => {
                match incoming {
                    None => return ServeExit::ConnectionLost,
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error");
                        return ServeExit::ConnectionLost;
                    }
                    Some(Ok(WsMessage::Ping(payload))) => {
                        if ws.send(WsMessage::Pong(payload)).await.is_err() {
                            return ServeExit::ConnectionLost;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => return ServeExit::ConnectionLost,
                    Some(Ok(WsMessage::Text(text))) => {
                        // Unsolicited frames (events) are not subscribed to,
                        // but tolerate them.
                        trace!(frame = %text, "Ignoring unsolicited frame");
                    }
                    Some(Ok(_)) => {}
                }
            }
            command = command_rx.recv() => {
                let Some(envelope) = command else {
                    // All session handles dropped.
                    let _ = ws.close(None).await;
                    return ServeExit::Shutdown;
                };
                let (result, lost) =
                    handle_command(&mut ws, shared, options, &envelope.scene).await;
                let _ = envelope.reply.send(result);
                if lost {
                    return ServeExit::ConnectionLost;
                }
            }
        }
    }
}

/// Executes one scene-switch command.
///
/// Returns the command result and whether the connection should be
/// considered lost.
async fn handle_command(
    ws: &mut Ws,
    shared: &Shared,
    options: &SessionOptions,
    scene: &str,
) -> (Result<(), CommandError>, bool) {
    // Existence check against the cached scene list, refreshed once on a
    // miss in case the user added the scene after we connected.
    let known = shared.scenes.read().await.iter().any(|s| s == scene);
    if !known {
        match roundtrip(ws, Request::get_scene_list(next_request_id()), options).await {
            Ok(response) if response.is_success() => {
                match response.scene_list() {
                    Ok(list) => {
                        *shared.scenes.write().await = list.scene_names();
                    }
                    Err(e) => {
                        warn!(error = %e, "Malformed scene list response");
                    }
                }
            }
            Ok(response) => {
                warn!(
                    code = response.request_status.code,
                    "Scene list refresh rejected"
                );
            }
            Err(RoundtripError::Timeout) => return (Err(CommandError::Timeout), true),
            Err(RoundtripError::Transport(_)) => {
                return (Err(CommandError::TransportFailure), true)
            }
        }

        let known_now = shared.scenes.read().await.iter().any(|s| s == scene);
        if !known_now {
            return (
                Err(CommandError::UnknownTarget {
                    scene: scene.to_string(),
                }),
                false,
            );
        }
    }

    let request = Request::set_current_program_scene(next_request_id(), scene);
    match roundtrip(ws, request, options).await {
        Ok(response) => {
            if response.is_success() {
                (Ok(()), false)
            } else if response.request_status.code == status::RESOURCE_NOT_FOUND {
                (
                    Err(CommandError::UnknownTarget {
                        scene: scene.to_string(),
                    }),
                    false,
                )
            } else {
                (
                    Err(CommandError::Remote {
                        code: response.request_status.code,
                        comment: response.request_status.comment.clone(),
                    }),
                    false,
                )
            }
        }
        Err(RoundtripError::Timeout) => (Err(CommandError::Timeout), true),
        Err(RoundtripError::Transport(_)) => (Err(CommandError::TransportFailure), true),
    }
}

enum RoundtripError {
    Transport(String),
    Timeout,
}

/// Sends a request and reads frames until its response arrives.
///
/// Bounded by the command timeout so a mute surface cannot wedge the serve
/// loop (and with it, shutdown).
async fn roundtrip(
    ws: &mut Ws,
    request: Request,
    options: &SessionOptions,
) -> Result<RequestResponse, RoundtripError> {
    let request_id = request.request_id.clone();
    let json = ClientMessage::Request(request)
        .to_json()
        .map_err(|e| RoundtripError::Transport(e.to_string()))?;

    ws.send(WsMessage::Text(json))
        .await
        .map_err(|e| RoundtripError::Transport(e.to_string()))?;

    let wait_for_response = async {
        loop {
            let incoming = ws
                .next()
                .await
                .ok_or_else(|| RoundtripError::Transport("connection closed".to_string()))?
                .map_err(|e| RoundtripError::Transport(e.to_string()))?;

            match incoming {
                WsMessage::Text(text) => match ServerMessage::from_json(&text) {
                    Ok(ServerMessage::RequestResponse(response))
                        if response.request_id == request_id =>
                    {
                        return Ok(response);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Ignoring undecodable frame");
                    }
                },
                WsMessage::Ping(payload) => {
                    ws.send(WsMessage::Pong(payload))
                        .await
                        .map_err(|e| RoundtripError::Transport(e.to_string()))?;
                }
                WsMessage::Close(_) => {
                    return Err(RoundtripError::Transport(
                        "connection closed by control surface".to_string(),
                    ))
                }
                _ => {}
            }
        }
    };

    match tokio::time::timeout(options.command_timeout, wait_for_response).await {
        Err(_) => Err(RoundtripError::Timeout),
        Ok(result) => result,
    }
}

async fn next_server_message(ws: &mut Ws) -> Result<ServerMessage, ConnectionError> {
    loop {
        let incoming = ws
            .next()
            .await
            .ok_or_else(|| ConnectionError::Unreachable("connection closed".to_string()))?
            .map_err(|e| ConnectionError::Unreachable(e.to_string()))?;

        match incoming {
            WsMessage::Text(text) => {
                return ServerMessage::from_json(&text)
                    .map_err(|e| ConnectionError::HandshakeFailed(e.to_string()))
            }
            WsMessage::Ping(payload) => {
                ws.send(WsMessage::Pong(payload))
                    .await
                    .map_err(|e| ConnectionError::Unreachable(e.to_string()))?;
            }
            WsMessage::Close(frame) => {
                let auth_rejected = frame
                    .as_ref()
                    .map(|f| u16::from(f.code) == close_code::AUTHENTICATION_FAILED)
                    .unwrap_or(false);
                return Err(if auth_rejected {
                    ConnectionError::AuthRejected
                } else {
                    ConnectionError::Unreachable("connection closed during handshake".to_string())
                });
            }
            _ => {}
        }
    }
}

async fn send_client(ws: &mut Ws, message: &ClientMessage) -> Result<(), ConnectionError> {
    let json = message
        .to_json()
        .map_err(|e| ConnectionError::HandshakeFailed(e.to_string()))?;
    ws.send(WsMessage::Text(json))
        .await
        .map_err(|e| ConnectionError::Unreachable(e.to_string()))
}
