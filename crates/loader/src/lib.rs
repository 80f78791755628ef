//! The deck loader (C2): resolves a deck/card graph from a path, merges
//! actions and schema fragments, detects cycles, and enforces naming
//! rules.

pub mod frontmatter;
pub mod loader;
pub mod source;
pub mod types;
pub mod uri;
pub mod validate;

pub use loader::load_deck;
pub use source::{CodeDeckSource, DeckSource, MarkdownDeckSource};
pub use types::{
    ActionDef, CardNode, DeckNode, EmbedRef, GuardrailsOverride, HandlerDef, Handlers, LoadedDeck, ModelParams,
    ModelSelector, SyntheticTools,
};
pub use validate::{assert_valid_action_name, is_valid_action_name};
