//! Session task
//!
//! One tokio task per session owns the [`SessionCore`], the current
//! transport, the batch ticker and the reconnect timer, all inside a single
//! `select!` loop. Ending the loop drops every timer and the socket at once,
//! so nothing can fire against a torn-down session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::game::state::{PlayerId, PlayerPatch};
use crate::metrics::{StatsSnapshot, SyncMetrics};
use crate::net::handler::HandlerRegistry;
use crate::net::protocol::{self, ClientMessage};
use crate::net::session::{Effect, Effects, SessionCore};
use crate::net::transport::{Connector, Outbound, TransportEvent, TransportHandle, CLOSE_ABNORMAL};

/// Requests from the manager to a session task
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    QueueUpdate { patch: PlayerPatch, timestamp_ms: u64 },
    /// Advance local simulation by `dt` seconds
    Simulate { dt: f32 },
    Ready,
    Eliminated,
    Winner { winner_id: PlayerId },
    RequestSync,
    /// A handler joined an already-running session
    HandlerAdded,
    Shutdown,
}

impl SessionCommand {
    fn kind(&self) -> &'static str {
        match self {
            SessionCommand::QueueUpdate { .. } => "queue_update",
            SessionCommand::Simulate { .. } => "simulate",
            SessionCommand::Ready => "ready",
            SessionCommand::Eliminated => "eliminated",
            SessionCommand::Winner { .. } => "winner",
            SessionCommand::RequestSync => "request_sync",
            SessionCommand::HandlerAdded => "handler_added",
            SessionCommand::Shutdown => "shutdown",
        }
    }
}

/// Manager-side handle to a running session task
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    status: watch::Receiver<StatsSnapshot>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Returns false if the task has already exited
    pub fn send(&self, command: SessionCommand) -> bool {
        let kind = command.kind();
        if self.commands.send(command).is_err() {
            debug!("Session task gone, dropping '{}'", kind);
            return false;
        }
        true
    }

    /// Latest status published by the task
    pub fn status(&self) -> StatsSnapshot {
        self.status.borrow().clone()
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the task for one session. Must be called inside a tokio runtime.
pub fn spawn_session(
    core: SessionCore,
    connector: Arc<dyn Connector>,
    handlers: Arc<HandlerRegistry>,
    metrics: Arc<SyncMetrics>,
    tick: Duration,
) -> SessionHandle {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(core.stats(handlers.len()));

    let task = SessionTask {
        core,
        connector,
        handlers,
        metrics,
        status: status_tx,
        transport: None,
    };
    let join = tokio::spawn(task.run(commands_rx, tick));

    SessionHandle {
        commands: commands_tx,
        status: status_rx,
        task: join,
    }
}

struct SessionTask {
    core: SessionCore,
    connector: Arc<dyn Connector>,
    handlers: Arc<HandlerRegistry>,
    metrics: Arc<SyncMetrics>,
    status: watch::Sender<StatsSnapshot>,
    transport: Option<TransportHandle>,
}

async fn next_event(transport: &mut Option<TransportHandle>) -> TransportEvent {
    match transport {
        Some(handle) => handle
            .next_event()
            .await
            .unwrap_or_else(|| TransportEvent::Closed {
                code: CLOSE_ABNORMAL,
                reason: "transport task exited".to_string(),
            }),
        None => std::future::pending().await,
    }
}

impl SessionTask {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>, tick: Duration) {
        info!("Session {} started", self.core.key());
        self.connect();

        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let reconnect = sleep(Duration::ZERO);
        tokio::pin!(reconnect);
        let mut reconnect_armed = false;

        loop {
            let effects = tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => {
                        self.shutdown();
                        break;
                    }
                    Some(command) => self.handle_command(command),
                },
                event = next_event(&mut self.transport) => self.handle_transport(event),
                _ = &mut reconnect, if reconnect_armed => {
                    reconnect_armed = false;
                    self.connect();
                    Effects::new()
                }
                // Scheduled instant, so a late tick does not push back the next send
                scheduled = ticker.tick() => self.core.on_tick(scheduled),
            };

            for effect in effects {
                if let Some(delay) = self.apply(effect) {
                    reconnect.as_mut().reset(Instant::now() + delay);
                    reconnect_armed = true;
                }
            }
            self.publish();
        }

        self.publish();
        info!("Session {} stopped", self.core.key());
    }

    fn connect(&mut self) {
        self.core.begin_connect();
        self.transport = Some(self.connector.open(self.core.url()));
    }

    fn shutdown(&mut self) {
        for effect in self.core.close() {
            self.apply(effect);
        }
        self.transport = None;
    }

    fn handle_command(&mut self, command: SessionCommand) -> Effects {
        match command {
            SessionCommand::QueueUpdate {
                patch,
                timestamp_ms,
            } => {
                self.core.queue_update(patch, timestamp_ms);
                Effects::new()
            }
            SessionCommand::Simulate { dt } => self.core.simulate(dt),
            SessionCommand::Ready => self.core.send_ready(),
            SessionCommand::Eliminated => self.core.send_eliminated(),
            SessionCommand::Winner { winner_id } => self.core.send_winner(winner_id),
            SessionCommand::RequestSync => self.core.request_sync(),
            SessionCommand::HandlerAdded => {
                if self.core.is_open() {
                    self.core.request_sync()
                } else {
                    Effects::new()
                }
            }
            // Handled by the loop
            SessionCommand::Shutdown => Effects::new(),
        }
    }

    fn handle_transport(&mut self, event: TransportEvent) -> Effects {
        let now = Instant::now();
        match event {
            TransportEvent::Opened => {
                SyncMetrics::incr(&self.metrics.sessions_opened);
                self.core.on_open(now)
            }
            TransportEvent::Text(text) => {
                self.metrics.record_received(text.len());
                match self.core.on_frame(&text, now) {
                    Ok(effects) => effects,
                    Err(e) => {
                        warn!("Session {} dropped unparseable frame: {}", self.core.key(), e);
                        SyncMetrics::incr(&self.metrics.parse_failures);
                        Effects::new()
                    }
                }
            }
            TransportEvent::Rejected(e) => {
                warn!("Session {} rejected frame: {}", self.core.key(), e);
                SyncMetrics::incr(&self.metrics.dropped_frames);
                Effects::new()
            }
            TransportEvent::Error(message) => {
                self.core.on_transport_error(&message);
                Effects::new()
            }
            TransportEvent::Closed { code, reason } => {
                self.transport = None;
                self.core.on_closed(code, &reason)
            }
        }
    }

    /// Perform one effect. Returns a reconnect delay to arm.
    fn apply(&mut self, effect: Effect) -> Option<Duration> {
        match effect {
            Effect::Send(message) => self.send(message),
            Effect::Emit(event) => {
                let panics = self.handlers.dispatch(&event);
                self.metrics.record_handler_panics(panics);
            }
            Effect::Connected => {
                let panics = self.handlers.broadcast_connected();
                self.metrics.record_handler_panics(panics);
            }
            Effect::Disconnected => {
                let panics = self.handlers.broadcast_disconnected();
                self.metrics.record_handler_panics(panics);
            }
            Effect::Error(error) => {
                let panics = self.handlers.broadcast(|handler| handler.on_error(&error));
                self.metrics.record_handler_panics(panics);
            }
            Effect::Reconnecting { attempt, delay } => {
                let panics = self
                    .handlers
                    .broadcast(|handler| handler.on_reconnecting(attempt, delay));
                self.metrics.record_handler_panics(panics);
            }
            Effect::ScheduleReconnect(delay) => {
                self.transport = None;
                SyncMetrics::incr(&self.metrics.reconnects_scheduled);
                return Some(delay);
            }
            Effect::Close { code, reason } => {
                if let Some(transport) = self.transport.take() {
                    let _ = transport.send(Outbound::Close {
                        code,
                        reason: reason.to_string(),
                    });
                }
            }
        }
        None
    }

    fn send(&mut self, message: ClientMessage) {
        let transport = match &self.transport {
            Some(transport) if self.core.is_open() => transport,
            _ => {
                warn!(
                    "Session {} not open, dropping '{}'",
                    self.core.key(),
                    message.kind()
                );
                SyncMetrics::incr(&self.metrics.sends_while_closed);
                return;
            }
        };

        let text = match protocol::encode(&message) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode '{}': {}", message.kind(), e);
                return;
            }
        };
        let len = text.len();
        if transport.send(Outbound::Text(text)).is_err() {
            warn!("Session {} transport gone, dropping '{}'", self.core.key(), message.kind());
            return;
        }
        self.core.record_sent(len);
        self.metrics.record_sent(len);
    }

    fn publish(&self) {
        self.status.send_replace(self.core.stats(self.handlers.len()));
    }
}
