//! The messaging session as the conversation core sees it, and the JSON-lines
//! protocol spoken with the bridge process that owns the real connection.
//!
//! Events arrive on the bridge's stdout, one JSON object per line, tagged by
//! `type`. Commands go to its stdin, tagged by `op`.

use std::io::{BufRead, BufReader, Read, Write};
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use crate::conversation::presence::PresenceSignal;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("bridge connection closed")]
    Closed,

    #[error("writing to bridge: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding bridge command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound side of a messaging session.
pub trait Session {
    fn send_text(&mut self, chat: &str, text: &str) -> Result<(), SessionError>;
    fn set_presence(&mut self, chat: &str, signal: PresenceSignal) -> Result<(), SessionError>;
}

/// A message posted into a private chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Conversation id, one per private chat.
    pub chat: String,
    /// Who actually posted, when the bridge can tell. Differs from `chat` when
    /// someone other than the contact writes into the thread.
    #[serde(default)]
    pub author: Option<String>,
    /// Sent from this account (our own echo).
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub text: String,
}

/// Lines the bridge writes to stdout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    Ready,
    Qr { code: String },
    Message(InboundMessage),
    Closed {
        #[serde(default)]
        logged_out: bool,
    },
}

/// Everything the supervisor loop can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Bridge(BridgeEvent),
    /// The bridge's stdout hit EOF.
    Exited,
    /// Ctrl-C or SIGTERM.
    Shutdown,
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Outbound<'a> {
    SendText { chat: &'a str, text: &'a str },
    Presence { chat: &'a str, state: PresenceSignal },
}

/// `Session` over any writer that reaches the bridge's stdin.
#[derive(Debug)]
pub struct BridgeSession<W: Write> {
    writer: W,
}

impl<W: Write> BridgeSession<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    fn write(&mut self, command: &Outbound<'_>) -> Result<(), SessionError> {
        let mut line = serde_json::to_string(command)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).map_err(|e| {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                SessionError::Closed
            } else {
                SessionError::Io(e)
            }
        })?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> Session for BridgeSession<W> {
    fn send_text(&mut self, chat: &str, text: &str) -> Result<(), SessionError> {
        self.write(&Outbound::SendText { chat, text })
    }

    fn set_presence(&mut self, chat: &str, signal: PresenceSignal) -> Result<(), SessionError> {
        self.write(&Outbound::Presence { chat, state: signal })
    }
}

/// Parse one stdout line. Group chats and anything else that is not a private
/// chat are dropped here so the core never sees them.
pub fn parse_event_line(line: &str, private_suffix: &str) -> Option<BridgeEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let event = match serde_json::from_str::<BridgeEvent>(line) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("ignoring unparseable bridge line: {e}");
            return None;
        }
    };
    if let BridgeEvent::Message(msg) = &event
        && !msg.chat.ends_with(private_suffix)
    {
        tracing::trace!("dropping non-private chat message");
        return None;
    }
    Some(event)
}

/// Forward bridge events into `tx` until EOF, then send [`SessionEvent::Exited`].
pub fn spawn_reader<R>(source: R, tx: Sender<SessionEvent>, private_suffix: String) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || {
        for line in BufReader::new(source).lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("bridge read failed: {e}");
                    break;
                }
            };
            if let Some(event) = parse_event_line(&line, &private_suffix)
                && tx.send(SessionEvent::Bridge(event)).is_err()
            {
                return;
            }
        }
        let _ = tx.send(SessionEvent::Exited);
    })
}
