//! Keeps the bridge process alive and feeds its events to the responder.
//!
//! One connection at a time: spawn the bridge, serve events until it drops,
//! back off, try again. Everything runs on the calling thread except the
//! stdout reader.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use anyhow::Context;

use crate::clock::Clock;
use crate::config::{Config, ConfigSource, SupervisorConfig};
use crate::conversation::Responder;
use crate::error::ExitError;
use crate::notify::{STARTED_NOTICE, STOPPED_NOTICE, StaffNotifier};
use crate::session::{BridgeEvent, BridgeSession, Session, SessionEvent, spawn_reader};
use crate::subprocess::BridgeCommand;
use crate::telemetry::redact;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Ready,
    Backoff { attempt: u32 },
    Stopped,
}

/// Why a connection stopped being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// Closed by the bridge or its process exited; worth retrying.
    Dropped,
    /// The account was unlinked; a new pairing is required.
    LoggedOut,
    Shutdown,
}

/// `base * 2^attempt`, capped at `max`.
pub fn backoff_delay(policy: &SupervisorConfig, attempt: u32) -> Duration {
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    let ms = policy
        .backoff_base_ms
        .saturating_mul(factor)
        .min(policy.backoff_max_ms);
    Duration::from_millis(ms)
}

/// Connection state plus the consecutive-failure count that drives backoff.
#[derive(Debug)]
pub struct Link {
    state: LinkState,
    failures: u32,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            state: LinkState::Connecting,
            failures: 0,
        }
    }
}

impl Link {
    pub const fn state(&self) -> LinkState {
        self.state
    }

    pub fn connecting(&mut self) {
        self.state = LinkState::Connecting;
    }

    pub fn ready(&mut self) {
        self.failures = 0;
        self.state = LinkState::Ready;
    }

    pub fn stop(&mut self) {
        self.state = LinkState::Stopped;
    }

    /// Record a dropped connection. Returns how long to wait before the next
    /// attempt, or `None` once `max_attempts` consecutive failures are reached.
    pub fn dropped(&mut self, policy: &SupervisorConfig) -> Option<Duration> {
        let attempt = self.failures;
        self.failures = self.failures.saturating_add(1);
        if policy.max_attempts > 0 && self.failures >= policy.max_attempts {
            self.state = LinkState::Stopped;
            return None;
        }
        self.state = LinkState::Backoff { attempt };
        Some(backoff_delay(policy, attempt))
    }

    pub const fn failures(&self) -> u32 {
        self.failures
    }
}

/// First signal queues a shutdown; a second one exits at once and abandons
/// whatever reply is in flight.
pub fn install_shutdown_handler(tx: Sender<SessionEvent>) -> anyhow::Result<()> {
    let requested = AtomicBool::new(false);
    ctrlc::set_handler(move || {
        if requested.swap(true, Ordering::SeqCst) {
            eprintln!("concierge: second interrupt, exiting now");
            std::process::exit(130);
        }
        let _ = tx.send(SessionEvent::Shutdown);
    })
    .context("installing signal handler")
}

/// Serve one connection until it ends. Config is re-read before each message.
pub fn serve<C: Clock>(
    link: &mut Link,
    source: &mut ConfigSource,
    responder: &mut Responder<C>,
    session: &mut dyn Session,
    events: &Receiver<SessionEvent>,
) -> ConnectionEnd {
    while let Ok(event) = events.recv() {
        match event {
            SessionEvent::Shutdown => return ConnectionEnd::Shutdown,
            SessionEvent::Exited => {
                tracing::warn!("bridge process exited");
                return ConnectionEnd::Dropped;
            }
            SessionEvent::Bridge(BridgeEvent::Ready) => {
                link.ready();
                tracing::info!("session ready");
                StaffNotifier::new(&source.current().staff).lifecycle(session, STARTED_NOTICE);
            }
            SessionEvent::Bridge(BridgeEvent::Qr { code }) => {
                tracing::info!(%code, "pairing required, scan this code with the phone");
            }
            SessionEvent::Bridge(BridgeEvent::Closed { logged_out: true }) => {
                tracing::error!("session logged out");
                return ConnectionEnd::LoggedOut;
            }
            SessionEvent::Bridge(BridgeEvent::Closed { logged_out: false }) => {
                tracing::warn!("session closed by bridge");
                return ConnectionEnd::Dropped;
            }
            SessionEvent::Bridge(BridgeEvent::Message(msg)) => {
                let config = source.reload();
                let _span = tracing::info_span!("message", contact = %redact(&msg.chat)).entered();
                match responder.handle(config, session, &msg) {
                    Ok(outcome) => tracing::info!(%outcome, "handled message"),
                    Err(e) => tracing::error!("handling message failed: {e}"),
                }
            }
        }
    }
    ConnectionEnd::Dropped
}

/// Wait out a backoff delay. Returns `true` if a shutdown arrived meanwhile.
fn wait_or_shutdown(events: &Receiver<SessionEvent>, delay: Duration) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(left) {
            Ok(SessionEvent::Shutdown) => return true,
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return false,
        }
    }
}

/// Drain events left over from a finished connection, keeping a pending shutdown.
fn drain_stale(events: &Receiver<SessionEvent>) -> bool {
    events
        .try_iter()
        .fold(false, |pending, e| pending || e == SessionEvent::Shutdown)
}

fn bridge_command(config: &Config) -> BridgeCommand {
    BridgeCommand::new(&config.bridge.command).args(&config.bridge.args)
}

/// Run until shutdown, logout, or too many failed connections.
pub fn run<C: Clock>(mut source: ConfigSource, mut responder: Responder<C>) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel();
    install_shutdown_handler(tx.clone())?;
    let mut link = Link::default();

    loop {
        link.connecting();
        let config = source.reload().clone();
        let command = bridge_command(&config);
        let mut bridge = command.spawn()?;
        tracing::info!(program = command.program(), pid = bridge.id(), "bridge started");

        let stdin = bridge
            .take_stdin()
            .ok_or_else(|| ExitError::Bridge("bridge stdin not captured".into()))?;
        let stdout = bridge
            .take_stdout()
            .ok_or_else(|| ExitError::Bridge("bridge stdout not captured".into()))?;
        let reader = spawn_reader(stdout, tx.clone(), config.bridge.private_suffix.clone());
        let mut session = BridgeSession::new(stdin);

        let end = serve(&mut link, &mut source, &mut responder, &mut session, &rx);

        if end == ConnectionEnd::Shutdown {
            tracing::info!("shutting down");
            StaffNotifier::new(&source.current().staff).lifecycle(&mut session, STOPPED_NOTICE);
        }
        drop(session);
        bridge.kill();
        if reader.join().is_err() {
            tracing::warn!("bridge reader thread panicked");
        }
        let shutdown_pending = drain_stale(&rx);

        match end {
            ConnectionEnd::Shutdown => {
                link.stop();
                return Ok(());
            }
            ConnectionEnd::LoggedOut => {
                link.stop();
                return Err(ExitError::LoggedOut.into());
            }
            ConnectionEnd::Dropped if shutdown_pending => {
                link.stop();
                return Ok(());
            }
            ConnectionEnd::Dropped => {
                let policy = &source.current().supervisor;
                let Some(delay) = link.dropped(policy) else {
                    return Err(ExitError::Bridge(format!(
                        "giving up after {} consecutive failed connections",
                        link.failures()
                    ))
                    .into());
                };
                tracing::warn!(attempt = link.failures(), delay_ms = delay.as_millis(), "reconnecting after backoff");
                if wait_or_shutdown(&rx, delay) {
                    link.stop();
                    return Ok(());
                }
            }
        }
    }
}
