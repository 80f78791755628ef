//! Resolution of the `gambit://` deck-local URI scheme (§6): references
//! deck authors use to pull in assets packaged with the core itself
//! (snippets, built-in schemas) rather than something on the local
//! filesystem.

use gambit_domain::error::Error;

const SNIPPET_RESPOND: &str = include_str!("../assets/snippets/respond.md");
const SCHEMA_GRADER_OUTPUT: &str = include_str!("../assets/schemas/grader_output.schema.json");

/// Resolve a `gambit://...` reference to its packaged content. Returns an
/// error for any scheme other than `gambit://` or any path not shipped
/// with the core — authors cannot smuggle arbitrary filesystem access
/// through this scheme.
pub fn resolve(uri: &str) -> Result<&'static str, Error> {
    let rest = uri
        .strip_prefix("gambit://")
        .ok_or_else(|| Error::Load(format!("not a gambit:// uri: {}", uri)))?;

    match rest {
        "snippets/respond.md" => Ok(SNIPPET_RESPOND),
        "schemas/graders/grader_output.zod.ts" | "schemas/graders/grader_output.schema.json" => {
            Ok(SCHEMA_GRADER_OUTPUT)
        }
        other => Err(Error::Load(format!("unknown gambit:// asset: {}", other))),
    }
}

pub fn is_gambit_uri(path: &str) -> bool {
    path.starts_with("gambit://")
}
