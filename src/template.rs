//! Template rendering for staff notices.

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

/// Context data passed to notice templates
#[derive(Debug, Serialize)]
pub struct NoticeContext<'a> {
    /// Contact's number: the conversation id up to the first `@`
    pub phone: &'a str,
    /// Full conversation id
    pub contact: &'a str,
}

impl<'a> NoticeContext<'a> {
    pub fn for_contact(contact: &'a str) -> Self {
        Self {
            phone: phone_of(contact),
            contact,
        }
    }
}

/// `5511999999999@s.whatsapp.net` → `5511999999999`.
pub fn phone_of(contact: &str) -> &str {
    contact.split('@').next().unwrap_or(contact)
}

/// Render a single notice template. Unknown variables are an error so a typo in
/// config does not silently produce an empty notice.
pub fn render_notice(template: &str, ctx: &NoticeContext<'_>) -> anyhow::Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    let rendered = env.render_str(template, ctx)?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_strips_server_suffix() {
        assert_eq!(phone_of("5511999999999@s.whatsapp.net"), "5511999999999");
        assert_eq!(phone_of("no-at-sign"), "no-at-sign");
    }

    #[test]
    fn renders_phone_and_contact() {
        let ctx = NoticeContext::for_contact("5511@s.whatsapp.net");
        let text = render_notice("New message from {{ phone }} ({{ contact }})", &ctx).unwrap();
        assert_eq!(text, "New message from 5511 (5511@s.whatsapp.net)");
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let ctx = NoticeContext::for_contact("5511@s.whatsapp.net");
        assert!(render_notice("Hi {{ nmber }}", &ctx).is_err());
    }

    #[test]
    fn plain_text_passes_through() {
        let ctx = NoticeContext::for_contact("1@s.whatsapp.net");
        assert_eq!(render_notice("Bot started!", &ctx).unwrap(), "Bot started!");
    }
}
