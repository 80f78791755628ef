//! TOML front-matter parsing for Markdown deck sources.
//!
//! Modeled on the teacher's YAML (`---`) SKILL.md frontmatter parser, but
//! decks use TOML delimited by `+++` per §6 of the format description.

/// Split a Markdown file into its `+++`-delimited front matter (parsed as
/// a TOML table) and the remaining body. Returns `(None, content)` when
/// the file has no front matter at all.
pub fn parse_frontmatter(content: &str) -> Result<(Option<toml::Table>, String), String> {
    let trimmed = content.trim_start();
    if !trimmed.starts_with("+++") {
        return Ok((None, content.to_string()));
    }

    let after_open = &trimmed[3..];
    let Some(close_idx) = after_open.find("\n+++") else {
        return Err("unterminated +++ front matter block".to_string());
    };

    let toml_str = &after_open[..close_idx];
    let body_start = close_idx + 4;
    let body = after_open[body_start..].trim_start_matches('\n').to_string();

    let table: toml::Table = toml::from_str(toml_str).map_err(|e| format!("invalid TOML front matter: {}", e))?;
    Ok((Some(table), strip_inline_embeds(&body)))
}

/// Strip inline embed markers (`![label](path)`) from a rendered body —
/// only the embedded card's own body contributes to the merged prompt,
/// per §6.
fn strip_inline_embeds(body: &str) -> String {
    let re = regex::Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("static regex is valid");
    re.replace_all(body, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_front_matter() {
        let md = "+++\nlabel = \"root\"\n+++\nHello there.\n";
        let (table, body) = parse_frontmatter(md).unwrap();
        let table = table.unwrap();
        assert_eq!(table["label"].as_str(), Some("root"));
        assert_eq!(body.trim(), "Hello there.");
    }

    #[test]
    fn no_front_matter_returns_none() {
        let md = "# Just a heading\nNo front matter.";
        let (table, body) = parse_frontmatter(md).unwrap();
        assert!(table.is_none());
        assert_eq!(body, md);
    }

    #[test]
    fn unterminated_block_is_an_error() {
        let md = "+++\nlabel = \"root\"\nstill going";
        assert!(parse_frontmatter(md).is_err());
    }

    #[test]
    fn strips_inline_embed_markers_from_body() {
        let md = "+++\n+++\nBefore ![grader](grader.md) after.";
        let (_, body) = parse_frontmatter(md).unwrap();
        assert_eq!(body.trim(), "Before  after.");
    }
}
