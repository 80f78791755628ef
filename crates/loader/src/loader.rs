use std::collections::HashMap;

use gambit_domain::error::{Error, Result};
use serde_json::{Map, Value};

use crate::source::DeckSource;
use crate::types::{ActionDef, CardNode, GuardrailsOverride, Handlers, LoadedDeck, SyntheticTools};
use crate::validate::assert_valid_action_name;

/// Load a deck graph rooted at `path`. `is_root` controls whether missing
/// input/output schemas are tolerated (root decks default to string
/// input/output; every other deck must declare both — §3).
pub fn load_deck(source: &dyn DeckSource, path: &str, is_root: bool) -> Result<LoadedDeck> {
    let deck = source.load_deck(path)?;

    for action in &deck.actions {
        assert_valid_action_name(&action.name)?;
    }

    let mut stack = vec![deck.path.clone()];
    let mut cards = Vec::new();
    let mut merged_actions: HashMap<String, ActionDef> = HashMap::new();
    let mut merged_input = schema_as_object(deck.input_schema.clone());
    let mut merged_output = schema_as_object(deck.output_schema.clone());

    for embed in &deck.embeds {
        flatten_embed(
            source,
            &embed.path,
            &mut stack,
            &mut cards,
            &mut merged_actions,
            &mut merged_input,
            &mut merged_output,
        )?;
    }

    // Deck's own actions win over any card-contributed action of the same name.
    for action in &deck.actions {
        merged_actions.insert(action.name.clone(), action.clone());
    }

    let input_schema = finalize_schema(merged_input);
    let output_schema = finalize_schema(merged_output);

    if !is_root && (input_schema.is_none() || output_schema.is_none()) {
        return Err(Error::Load(format!(
            "{}: non-root decks must declare both inputSchema and outputSchema",
            deck.path
        )));
    }

    let prompt = build_prompt(deck.prompt.as_deref(), &cards);

    Ok(LoadedDeck {
        path: deck.path,
        label: deck.label,
        cards: cards.into_iter().map(|c| c.path).collect(),
        prompt,
        model_params: deck.model_params,
        input_schema,
        output_schema,
        actions: merged_actions,
        handlers: deck.handlers,
        synthetic_tools: deck.synthetic_tools,
        guardrails: deck.guardrails,
        executor: deck.executor,
    })
}

#[allow(clippy::too_many_arguments)]
fn flatten_embed(
    source: &dyn DeckSource,
    path: &str,
    stack: &mut Vec<String>,
    cards: &mut Vec<CardNode>,
    merged_actions: &mut HashMap<String, ActionDef>,
    merged_input: &mut Option<Map<String, Value>>,
    merged_output: &mut Option<Map<String, Value>>,
) -> Result<()> {
    if let Some(pos) = stack.iter().position(|p| p == path) {
        let mut chain: Vec<&str> = stack[pos..].iter().map(String::as_str).collect();
        chain.push(path);
        return Err(Error::Load(format!("Card/embed cycle detected: {}", chain.join(" -> "))));
    }

    let card = source.load_card(path)?;
    stack.push(path.to_string());

    for action in &card.actions {
        assert_valid_action_name(&action.name)?;
        merged_actions.entry(action.name.clone()).or_insert_with(|| action.clone());
    }

    merge_schema_fragment(merged_input, card.input_fragment.clone())?;
    merge_schema_fragment(merged_output, card.output_fragment.clone())?;

    for nested in &card.embeds {
        flatten_embed(source, &nested.path, stack, cards, merged_actions, merged_input, merged_output)?;
    }

    stack.pop();
    cards.push(card);
    Ok(())
}

fn schema_as_object(schema: Option<Value>) -> Option<Map<String, Value>> {
    match schema {
        Some(Value::Object(obj)) => Some(obj),
        Some(_) | None => None,
    }
}

fn finalize_schema(map: Option<Map<String, Value>>) -> Option<Value> {
    map.map(Value::Object)
}

/// Shallow field union (§3): fields present in only one side pass
/// through; fields present in both with equal values are kept; fields
/// present in both with differing values are a hard error.
fn merge_schema_fragment(base: &mut Option<Map<String, Value>>, fragment: Option<Value>) -> Result<()> {
    let Some(Value::Object(frag)) = fragment else {
        return Ok(());
    };
    let target = base.get_or_insert_with(Map::new);
    for (key, value) in frag {
        match target.get(&key) {
            None => {
                target.insert(key, value);
            }
            Some(existing) if *existing == value => {}
            Some(existing) => {
                return Err(Error::Load(format!(
                    "conflicting schema field \"{}\": {:?} vs {:?}",
                    key, existing, value
                )));
            }
        }
    }
    Ok(())
}

fn build_prompt(deck_prompt: Option<&str>, cards: &[CardNode]) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(p) = deck_prompt {
        let trimmed = p.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
    }
    for card in cards {
        if let Some(body) = &card.body {
            let trimmed = body.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
    }
    parts.join("\n\n")
}
