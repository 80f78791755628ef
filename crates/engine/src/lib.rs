//! The run engine (C5): the recursive deck turn loop, tool dispatch, and
//! guardrail enforcement at the heart of an agent run.

pub mod context;
pub mod dispatch;
pub mod guardrails;
pub mod idle;
pub mod run;
pub mod state;
pub mod synthetic;

pub use context::{RunContext, StateUpdateFn, StreamTextFn};
pub use dispatch::{dispatch_tool_call, DispatchOutcome};
pub use guardrails::{EffectiveGuardrails, TurnClock};
pub use idle::ActivityClock;
pub use run::{run_deck, RunInput};
pub use state::SavedState;
