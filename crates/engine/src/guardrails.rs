//! Guardrail resolution and enforcement (§4.6, §7 GuardrailError).
//!
//! Deck-level `GuardrailsOverride` values win when present; otherwise the
//! spec's own defaults apply (`maxDepth=3`, `maxPasses=3`,
//! `timeoutMs=120_000`). The project-wide `gambit.toml` `[guardrails]`
//! section acts as an outer ceiling: it can only tighten (lower) a deck's
//! effective `maxDepth`/`maxTurns`, never loosen it — a deck author should
//! not be able to override an operator's safety ceiling.

use std::time::Instant;

use gambit_domain::config::GuardrailsConfig;
use gambit_domain::error::Error;
use gambit_loader::GuardrailsOverride;

pub const DEFAULT_MAX_DEPTH: u32 = 3;
pub const DEFAULT_MAX_PASSES: u32 = 3;
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_BUSY_DELAY_MS: u64 = 800;

#[derive(Debug, Clone, Copy)]
pub struct EffectiveGuardrails {
    pub max_depth: u32,
    pub max_passes: u32,
    pub timeout_ms: u64,
}

impl EffectiveGuardrails {
    pub fn resolve(deck: &GuardrailsOverride, project: &GuardrailsConfig) -> Self {
        let max_depth = deck.max_depth.unwrap_or(DEFAULT_MAX_DEPTH).min(project.max_depth);
        let max_passes = deck.max_passes.unwrap_or(DEFAULT_MAX_PASSES);
        let timeout_ms = deck.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
        EffectiveGuardrails { max_depth, max_passes, timeout_ms }
    }
}

/// Tracks the wall-clock budget for one deck turn loop.
pub struct TurnClock {
    started: Instant,
    timeout_ms: u64,
}

impl TurnClock {
    pub fn start(timeout_ms: u64) -> Self {
        TurnClock { started: Instant::now(), timeout_ms }
    }

    /// Fails with `Timeout exceeded` if the budget is spent. Checked at the
    /// top of every pass (§4.6 step 4a).
    pub fn check(&self) -> Result<(), Error> {
        if self.started.elapsed().as_millis() as u64 >= self.timeout_ms {
            return Err(Error::Guardrail("Timeout exceeded".to_string()));
        }
        Ok(())
    }
}

/// Fails with `Max depth exceeded` before the child deck is even loaded.
pub fn check_depth(depth: u32, max_depth: u32) -> Result<(), Error> {
    if depth > max_depth {
        return Err(Error::Guardrail("Max depth exceeded".to_string()));
    }
    Ok(())
}

/// Fails with `Max passes exceeded without completing` once the pass
/// counter reaches the deck's `maxPasses`.
pub fn check_passes(pass: u32, max_passes: u32) -> Result<(), Error> {
    if pass >= max_passes {
        return Err(Error::Guardrail("Max passes exceeded without completing".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deck_override_wins_over_spec_default() {
        let deck = GuardrailsOverride { max_depth: Some(7), max_passes: None, timeout_ms: None };
        let project = GuardrailsConfig { max_turns: 50, max_depth: 10, idle_timeout_ms: 30_000, busy_timeout_ms: 120_000 };
        let eff = EffectiveGuardrails::resolve(&deck, &project);
        assert_eq!(eff.max_depth, 7);
        assert_eq!(eff.max_passes, DEFAULT_MAX_PASSES);
    }

    #[test]
    fn project_ceiling_caps_deck_override() {
        let deck = GuardrailsOverride { max_depth: Some(50), max_passes: None, timeout_ms: None };
        let project = GuardrailsConfig { max_turns: 50, max_depth: 5, idle_timeout_ms: 30_000, busy_timeout_ms: 120_000 };
        let eff = EffectiveGuardrails::resolve(&deck, &project);
        assert_eq!(eff.max_depth, 5);
    }

    #[test]
    fn depth_check_is_fatal_over_limit() {
        assert!(check_depth(4, 3).is_err());
        assert!(check_depth(3, 3).is_ok());
    }
}
