//! Per-message policy: ignore, hand over to staff, or answer with paced delivery.
//!
//! A contact is ACTIVE until it is escalated, then ESCALATED forever. The
//! blocklist in [`Store`] is the only record of that state.

use std::fmt;
use std::time::Duration;

use rand::RngCore;

use super::context::{ContextWindows, Speaker};
use super::presence::{self, PresencePlan, PresenceSignal};
use super::store::Store;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::StoreError;
use crate::llm::LanguageModel;
use crate::notify::StaffNotifier;
use crate::session::{InboundMessage, Session, SessionError};
use crate::telemetry::redact;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Contact already handed to staff.
    Escalated,
    /// Our own outgoing message echoed back.
    OwnMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationCause {
    TriggerWord,
    StaffIntervention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ignored(IgnoreReason),
    Escalated(EscalationCause),
    Replied {
        first_contact: bool,
        /// The model failed or said nothing and a canned reply went out instead.
        fallback: bool,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignored(IgnoreReason::Escalated) => f.write_str("ignored (escalated contact)"),
            Self::Ignored(IgnoreReason::OwnMessage) => f.write_str("ignored (own message)"),
            Self::Escalated(EscalationCause::TriggerWord) => f.write_str("escalated (trigger word)"),
            Self::Escalated(EscalationCause::StaffIntervention) => {
                f.write_str("escalated (staff intervention)")
            }
            Self::Replied { first_contact, fallback } => {
                write!(f, "replied (first_contact={first_contact}, fallback={fallback})")
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    #[error(transparent)]
    State(#[from] StoreError),

    #[error("delivery failed: {0}")]
    Delivery(#[from] SessionError),
}

/// Case-insensitive substring match.
pub fn contains_trigger(text: &str, trigger: &str) -> bool {
    text.to_lowercase().contains(&trigger.to_lowercase())
}

/// Remove `*` emphasis markers; the chat client would render them literally.
pub fn strip_emphasis(text: &str) -> String {
    text.replace('*', "")
}

fn compose_prompt(preamble: Option<&str>, transcript: &str) -> String {
    match preamble.filter(|p| !p.is_empty()) {
        Some(preamble) => format!("{preamble}\n{transcript}"),
        None => transcript.to_string(),
    }
}

/// Owns the conversation state and decides what happens to each message.
pub struct Responder<C: Clock> {
    store: Store,
    windows: ContextWindows,
    model: Box<dyn LanguageModel>,
    clock: C,
    rng: Box<dyn RngCore>,
}

impl<C: Clock> Responder<C> {
    pub fn new(
        store: Store,
        windows: ContextWindows,
        model: Box<dyn LanguageModel>,
        clock: C,
        rng: Box<dyn RngCore>,
    ) -> Self {
        Self {
            store,
            windows,
            model,
            clock,
            rng,
        }
    }

    pub const fn store(&self) -> &Store {
        &self.store
    }

    pub const fn windows(&self) -> &ContextWindows {
        &self.windows
    }

    /// Process one inbound private message to completion, including every
    /// presence delay.
    pub fn handle(
        &mut self,
        config: &Config,
        session: &mut dyn Session,
        msg: &InboundMessage,
    ) -> Result<Outcome, HandleError> {
        let now = self.clock.now_millis();
        let expired = self.windows.expire_stale(now)?;
        if expired > 0 {
            tracing::debug!(expired, "dropped stale conversation windows");
        }

        let chat = msg.chat.as_str();

        if self.store.is_blocked(chat) {
            return Ok(Outcome::Ignored(IgnoreReason::Escalated));
        }
        if msg.from_me {
            return Ok(Outcome::Ignored(IgnoreReason::OwnMessage));
        }
        if contains_trigger(&msg.text, config.trigger_word()) {
            self.handoff(config, session, chat)?;
            return Ok(Outcome::Escalated(EscalationCause::TriggerWord));
        }
        if msg.author.as_deref().is_some_and(|author| author != chat) {
            self.escalate(chat)?;
            tracing::info!(contact = %redact(chat), "bot disabled for contact after staff intervention");
            if let Err(e) = session.set_presence(chat, PresenceSignal::Unavailable) {
                tracing::warn!("failed to clear presence: {e}");
            }
            return Ok(Outcome::Escalated(EscalationCause::StaffIntervention));
        }

        self.reply(config, session, msg)
    }

    /// Trigger word: acknowledge once, then never answer this contact again.
    fn handoff(&mut self, config: &Config, session: &mut dyn Session, chat: &str) -> Result<(), HandleError> {
        let sent = session
            .set_presence(chat, PresenceSignal::Composing)
            .and_then(|()| session.send_text(chat, &config.responder.handoff_message));
        self.escalate(chat)?;
        let cleanup = session.set_presence(chat, PresenceSignal::Unavailable);
        tracing::info!(contact = %redact(chat), "contact asked for a human");
        StaffNotifier::new(&config.staff).handoff(session, chat);
        sent.and(cleanup)?;
        Ok(())
    }

    fn escalate(&mut self, chat: &str) -> Result<(), StoreError> {
        self.store.mark_blocked(chat)?;
        self.windows.clear(chat)
    }

    fn reply(
        &mut self,
        config: &Config,
        session: &mut dyn Session,
        msg: &InboundMessage,
    ) -> Result<Outcome, HandleError> {
        let chat = msg.chat.as_str();
        let timing = &config.timing;
        let first_contact = !self.store.is_known(chat);
        if first_contact {
            StaffNotifier::new(&config.staff).new_contact(session, chat, self.rng.as_mut());
        }

        self.windows.append(chat, Speaker::User, &msg.text, self.clock.now_millis())?;
        let prompt = compose_prompt(
            config.responder.prompt_preamble.as_deref(),
            &self.windows.render(chat),
        );

        let (reply, fallback) = match self.model.generate(&prompt) {
            Ok(text) => {
                let (text, empty) = if text.trim().is_empty() {
                    (config.responder.empty_reply.clone(), true)
                } else {
                    (text, false)
                };
                self.windows.append(chat, Speaker::Bot, &text, self.clock.now_millis())?;
                (text, empty)
            }
            Err(e) => {
                tracing::warn!(contact = %redact(chat), "language model failed: {e}");
                (config.responder.fallback_reply.clone(), true)
            }
        };
        let reply = strip_emphasis(&reply);

        let plan = if first_contact {
            self.clock.sleep(Duration::from_millis(timing.first_contact_delay_ms));
            self.store.mark_known(chat)?;
            PresencePlan::first_contact(timing)
        } else {
            PresencePlan::regular(&reply, timing, self.rng.as_mut())
        };

        presence::deliver(
            session,
            &self.clock,
            chat,
            &reply,
            &plan,
            Duration::from_millis(timing.cooldown_ms),
        )?;
        Ok(Outcome::Replied { first_contact, fallback })
    }
}
