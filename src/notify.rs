//! Fire-and-forget notices to the staff group chat.

use rand::RngCore;
use rand::seq::IndexedRandom;

use crate::config::StaffConfig;
use crate::session::Session;
use crate::template::{NoticeContext, render_notice};

pub const STARTED_NOTICE: &str = "Bot started!";
pub const STOPPED_NOTICE: &str = "Bot stopped!";
const HANDOFF_NOTICE: &str = "{{ phone }} asked to talk to a person. The bot will no longer answer this contact.";
const FALLBACK_NEW_CONTACT: &str = "New message from {{ phone }}.";

/// Posts notices to the configured staff group. Every failure is logged and
/// swallowed; nothing here can affect a reply to a contact.
#[derive(Debug, Clone, Copy)]
pub struct StaffNotifier<'a> {
    config: &'a StaffConfig,
}

impl<'a> StaffNotifier<'a> {
    pub const fn new(config: &'a StaffConfig) -> Self {
        Self { config }
    }

    /// One of the new-contact variations, picked at random.
    pub fn new_contact(&self, session: &mut dyn Session, contact: &str, rng: &mut dyn RngCore) {
        let template = self
            .config
            .new_contact_templates
            .choose(rng)
            .map_or(FALLBACK_NEW_CONTACT, String::as_str);
        self.post_template(session, template, contact);
    }

    pub fn handoff(&self, session: &mut dyn Session, contact: &str) {
        self.post_template(session, HANDOFF_NOTICE, contact);
    }

    /// Start/stop announcements, if enabled.
    pub fn lifecycle(&self, session: &mut dyn Session, text: &str) {
        if self.config.announce_lifecycle {
            self.post(session, text);
        }
    }

    fn post_template(&self, session: &mut dyn Session, template: &str, contact: &str) {
        match render_notice(template, &NoticeContext::for_contact(contact)) {
            Ok(text) => self.post(session, &text),
            Err(e) => tracing::warn!("bad staff notice template {template:?}: {e}"),
        }
    }

    fn post(&self, session: &mut dyn Session, text: &str) {
        let Some(group) = self.config.group.as_deref() else {
            tracing::debug!("no staff group configured, skipping notice");
            return;
        };
        if let Err(e) = session.send_text(group, text) {
            tracing::warn!("failed to notify staff group: {e}");
        }
    }
}
