use gambit_domain::error::Error;

const MAX_ACTION_NAME_LEN: usize = 64;
const RESERVED_PREFIX: &str = "gambit_";
const SYNTHETIC_NAMES: [&str; 2] = ["gambit_init", "gambit_respond"];

/// Validates an action name: `^[A-Za-z_][A-Za-z0-9_]*$`, length ≤ 64, and
/// not prefixed `gambit_` — except the two synthetic names the engine
/// itself produces, which a deck author is never allowed to declare.
pub fn is_valid_action_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_ACTION_NAME_LEN {
        return false;
    }
    let mut chars = name.chars();
    let Some(first) = chars.next() else { return false };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return false;
    }
    if name.starts_with(RESERVED_PREFIX) && !SYNTHETIC_NAMES.contains(&name) {
        return false;
    }
    true
}

pub fn assert_valid_action_name(name: &str) -> Result<(), Error> {
    if is_valid_action_name(name) {
        Ok(())
    } else {
        Err(Error::Load(format!(
            "invalid action name \"{}\": must match ^[A-Za-z_][A-Za-z0-9_]*$, length <= {}, and not use the reserved \"gambit_\" prefix",
            name, MAX_ACTION_NAME_LEN
        )))
    }
}
