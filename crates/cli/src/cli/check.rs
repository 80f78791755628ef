//! `gambit check` — load a deck and report whether it's runnable without
//! actually running it.

use gambit_domain::config::{Config, ConfigSeverity};
use gambit_loader::{load_deck, MarkdownDeckSource, ModelSelector};

/// Load `deck` and validate it against the current project config.
///
/// Returns `true` when the deck is runnable. Both a legacy `codex/` model
/// prefix on the deck and a `providers.fallback = "codex"` project config
/// value fail the check, even if they'd otherwise be independent of one
/// another.
pub fn run(config: &Config, deck_path: &str) -> bool {
    let mut ok = true;

    if let Some(fallback) = &config.providers.fallback {
        if fallback == "codex" {
            println!("FAIL: providers.fallback \"codex\" is no longer supported");
            ok = false;
        }
    }

    let source = MarkdownDeckSource::new();
    let loaded = match load_deck(&source, deck_path, true) {
        Ok(d) => d,
        Err(e) => {
            println!("FAIL: {e}");
            return false;
        }
    };

    if let Some(params) = &loaded.model_params {
        if let Some(selector) = &params.model {
            let candidates: Vec<&str> = match selector {
                ModelSelector::Single(m) => vec![m.as_str()],
                ModelSelector::Candidates(list) => list.iter().map(String::as_str).collect(),
            };
            for model in candidates {
                if model.starts_with("codex/") {
                    println!("FAIL: legacy codex prefix is unsupported (model \"{model}\")");
                    ok = false;
                }
            }
        }
    }

    let issues = config.validate();
    for issue in issues.iter().filter(|i| i.severity == ConfigSeverity::Error) {
        println!("FAIL: {issue}");
        ok = false;
    }

    if ok {
        println!("OK: {} ({})", deck_path, loaded.label.as_deref().unwrap_or("untitled"));
    }

    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_domain::config::Config;

    fn write_deck(dir: &std::path::Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn check_rejects_legacy_codex_model_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let deck = write_deck(
            &dir.path(),
            "root.md",
            "+++\nlabel = \"root\"\n\n[modelParams]\nmodel = \"codex/default\"\n+++\nYou are a helpful agent.",
        );

        let config = Config::default();
        let ok = run(&config, &deck);
        assert!(!ok);
    }

    #[test]
    fn check_rejects_legacy_codex_fallback_config() {
        let dir = tempfile::tempdir().unwrap();
        let deck = write_deck(
            &dir.path(),
            "root.md",
            "+++\nlabel = \"root\"\n\n[modelParams]\nmodel = \"dummy-model\"\n+++\nYou are a helpful agent.",
        );

        let mut config = Config::default();
        config.providers.fallback = Some("codex".to_string());
        let ok = run(&config, &deck);
        assert!(!ok);
    }

    #[test]
    fn check_accepts_a_clean_deck() {
        let dir = tempfile::tempdir().unwrap();
        let deck = write_deck(
            &dir.path(),
            "root.md",
            "+++\nlabel = \"root\"\n\n[modelParams]\nmodel = \"dummy-model\"\n+++\nYou are a helpful agent.",
        );

        let config = Config::default();
        assert!(run(&config, &deck));
    }
}
