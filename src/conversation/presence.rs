//! Humanized delivery: presence signals, typing time, and guaranteed cleanup.

use std::time::Duration;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::TimingConfig;
use crate::session::{Session, SessionError};

/// Indicator shown to the remote party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceSignal {
    Available,
    Composing,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceStep {
    pub signal: PresenceSignal,
    /// How long to hold after the signal is issued.
    pub hold: Duration,
}

impl PresenceStep {
    const fn new(signal: PresenceSignal, hold: Duration) -> Self {
        Self { signal, hold }
    }
}

/// Ordered presence steps shown before a reply goes out. Computed per reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresencePlan {
    pub steps: Vec<PresenceStep>,
}

impl PresencePlan {
    /// online, typing for a time scaled to `reply`, online again.
    pub fn regular(reply: &str, timing: &TimingConfig, rng: &mut dyn RngCore) -> Self {
        let online = Duration::from_millis(timing.online_ms);
        Self {
            steps: vec![
                PresenceStep::new(PresenceSignal::Available, online),
                PresenceStep::new(PresenceSignal::Composing, typing_duration(reply, timing, rng)),
                PresenceStep::new(PresenceSignal::Available, online),
            ],
        }
    }

    /// Fixed-length plan for a contact's very first reply.
    pub fn first_contact(timing: &TimingConfig) -> Self {
        let online = Duration::from_millis(timing.online_ms);
        Self {
            steps: vec![
                PresenceStep::new(PresenceSignal::Available, online),
                PresenceStep::new(
                    PresenceSignal::Composing,
                    Duration::from_millis(timing.first_contact_typing_ms),
                ),
                PresenceStep::new(PresenceSignal::Available, online),
            ],
        }
    }
}

/// Time spent "typing" a reply: a base per length band plus bounded jitter.
pub fn typing_duration(reply: &str, timing: &TimingConfig, rng: &mut dyn RngCore) -> Duration {
    let len = reply.chars().count();
    let (base, jitter) = if len <= timing.short_max_chars {
        (timing.short_base_ms, timing.short_jitter_ms)
    } else if len <= timing.medium_max_chars {
        (timing.medium_base_ms, timing.medium_jitter_ms)
    } else {
        (timing.long_base_ms, timing.long_jitter_ms)
    };
    let extra = if jitter == 0 { 0 } else { rng.random_range(0..jitter) };
    Duration::from_millis(base.saturating_add(extra))
}

/// Play `plan`, send `text`, show online for `cooldown`, then go unavailable.
///
/// `unavailable` is issued on every path. If a step or the send fails, the
/// remaining steps are skipped, cleanup runs, and the first error is returned.
pub fn deliver<S, C>(
    session: &mut S,
    clock: &C,
    chat: &str,
    text: &str,
    plan: &PresencePlan,
    cooldown: Duration,
) -> Result<(), SessionError>
where
    S: Session + ?Sized,
    C: Clock + ?Sized,
{
    let outcome = play_and_send(session, clock, chat, text, plan, cooldown);
    let cleanup = session.set_presence(chat, PresenceSignal::Unavailable);
    if let Err(e) = &cleanup {
        tracing::warn!("failed to clear presence: {e}");
    }
    outcome.and(cleanup)
}

fn play_and_send<S, C>(
    session: &mut S,
    clock: &C,
    chat: &str,
    text: &str,
    plan: &PresencePlan,
    cooldown: Duration,
) -> Result<(), SessionError>
where
    S: Session + ?Sized,
    C: Clock + ?Sized,
{
    for step in &plan.steps {
        session.set_presence(chat, step.signal)?;
        tracing::debug!(signal = ?step.signal, hold_ms = step.hold.as_millis(), "presence");
        clock.sleep(step.hold);
    }
    session.send_text(chat, text)?;
    session.set_presence(chat, PresenceSignal::Available)?;
    clock.sleep(cooldown);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::fake::{Call, FakeSession};
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn clock() -> ManualClock {
        ManualClock::starting_at(chrono::Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap())
    }

    fn ms(d: Duration) -> u128 {
        d.as_millis()
    }

    #[test]
    fn huge_configured_band_saturates() {
        let timing = TimingConfig {
            short_base_ms: u64::MAX - 1,
            short_jitter_ms: 1000,
            ..TimingConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let d = typing_duration("ok", &timing, &mut rng);
        assert!(d >= Duration::from_millis(u64::MAX - 1));
    }

    #[test]
    fn typing_bands_stay_in_bounds() {
        let timing = TimingConfig::default();
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let short = ms(typing_duration(&"a".repeat(50), &timing, &mut rng));
            let medium = ms(typing_duration(&"a".repeat(150), &timing, &mut rng));
            let long = ms(typing_duration(&"a".repeat(400), &timing, &mut rng));
            assert!((1500..=2000).contains(&short), "short {short}");
            assert!((3500..=4500).contains(&medium), "medium {medium}");
            assert!((5000..=7000).contains(&long), "long {long}");
        }
    }

    #[test]
    fn band_edges_are_inclusive() {
        let timing = TimingConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        assert!(ms(typing_duration(&"x".repeat(80), &timing, &mut rng)) < 2000);
        assert!(ms(typing_duration(&"x".repeat(81), &timing, &mut rng)) >= 3500);
        assert!(ms(typing_duration(&"x".repeat(250), &timing, &mut rng)) < 4500);
        assert!(ms(typing_duration(&"x".repeat(251), &timing, &mut rng)) >= 5000);
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let timing = TimingConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        // 80 two-byte characters is still a short reply
        let accented = "é".repeat(80);
        assert!(ms(typing_duration(&accented, &timing, &mut rng)) < 2000);
    }

    #[test]
    fn zero_jitter_is_exact() {
        let timing = TimingConfig {
            short_jitter_ms: 0,
            ..TimingConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(ms(typing_duration("ok", &timing, &mut rng)), 1500);
    }

    #[test]
    fn deliver_plays_plan_then_sends_then_cleans_up() {
        let mut session = FakeSession::default();
        let clock = clock();
        let plan = PresencePlan::first_contact(&TimingConfig::default());

        deliver(&mut session, &clock, "x", "hello", &plan, Duration::from_secs(5)).unwrap();

        assert_eq!(
            session.calls,
            vec![
                Call::presence("x", PresenceSignal::Available),
                Call::presence("x", PresenceSignal::Composing),
                Call::presence("x", PresenceSignal::Available),
                Call::text("x", "hello"),
                Call::presence("x", PresenceSignal::Available),
                Call::presence("x", PresenceSignal::Unavailable),
            ]
        );
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(5),
                Duration::from_secs(5),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );
    }

    #[test]
    fn unavailable_fires_when_send_fails() {
        let mut session = FakeSession {
            fail_send: true,
            ..FakeSession::default()
        };
        let clock = clock();
        let plan = PresencePlan::first_contact(&TimingConfig::default());

        let result = deliver(&mut session, &clock, "x", "hello", &plan, Duration::from_secs(5));

        assert!(result.is_err());
        assert_eq!(
            session.calls.last(),
            Some(&Call::presence("x", PresenceSignal::Unavailable))
        );
        assert!(!session.calls.iter().any(|c| matches!(c, Call::Text { .. })));
        // No cooldown after a failed send
        assert_eq!(clock.sleeps().len(), 3);
    }

    #[test]
    fn unavailable_fires_when_a_step_fails() {
        let mut session = FakeSession {
            fail_presence: Some(PresenceSignal::Composing),
            ..FakeSession::default()
        };
        let clock = clock();
        let plan = PresencePlan::first_contact(&TimingConfig::default());

        assert!(deliver(&mut session, &clock, "x", "hi", &plan, Duration::ZERO).is_err());
        assert_eq!(
            session.calls.last(),
            Some(&Call::presence("x", PresenceSignal::Unavailable))
        );
    }

    #[test]
    fn regular_plan_scales_typing_with_reply() {
        let timing = TimingConfig::default();
        let mut rng = StdRng::seed_from_u64(11);
        let plan = PresencePlan::regular(&"w".repeat(300), &timing, &mut rng);

        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[0].hold, Duration::from_secs(5));
        assert_eq!(plan.steps[1].signal, PresenceSignal::Composing);
        assert!(plan.steps[1].hold >= Duration::from_millis(5000));
        assert!(plan.steps[1].hold < Duration::from_millis(7000));
    }
}
