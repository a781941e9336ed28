use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Failure while expanding `{{ env.VAR }}` placeholders
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvExpansionError {
    /// Referenced variable is unset and no default was given
    #[error("environment variable not found: `{name}` (line {line})")]
    MissingVariable { name: String, line: usize },

    /// Placeholder used a scope other than `env.`
    #[error("only variables scoped with 'env.' are supported: `{key}` (line {line})")]
    UnsupportedScope { key: String, line: usize },
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Group 1: dotted key, group 2: optional default("...") value
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([a-zA-Z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
    })
}

/// Expand placeholders against the process environment
///
/// # Errors
///
/// See [`expand_env_with`].
pub fn expand_env(input: &str) -> Result<String, EnvExpansionError> {
    expand_env_with(input, |name| std::env::var(name).ok())
}

/// Expand `{{ env.VAR }}` and `{{ env.VAR | default("x") }}` placeholders
///
/// Operates on raw settings text before deserialization. Lines whose
/// first non-blank character is `#` are copied unchanged so commented-out
/// settings never require their variables.
///
/// # Errors
///
/// Returns an error for an unset variable without default, or for a
/// placeholder outside the `env.` scope.
pub fn expand_env_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String, EnvExpansionError> {
    let mut lines = Vec::new();

    for (index, line) in input.lines().enumerate() {
        let line_number = index + 1;

        if line.trim_start().starts_with('#') {
            lines.push(line.to_owned());
            continue;
        }

        let mut expanded = String::with_capacity(line.len());
        let mut cursor = 0;

        for captures in placeholder().captures_iter(line) {
            let (Some(whole), Some(key)) = (captures.get(0), captures.get(1)) else {
                continue;
            };

            expanded.push_str(&line[cursor..whole.start()]);

            let name = key
                .as_str()
                .strip_prefix("env.")
                .filter(|rest| !rest.is_empty() && !rest.contains('.'))
                .ok_or_else(|| EnvExpansionError::UnsupportedScope {
                    key: key.as_str().to_owned(),
                    line: line_number,
                })?;

            let value = lookup(name)
                .or_else(|| captures.get(2).map(|m| m.as_str().to_owned()))
                .ok_or_else(|| EnvExpansionError::MissingVariable {
                    name: name.to_owned(),
                    line: line_number,
                })?;

            expanded.push_str(&value);
            cursor = whole.end();
        }

        expanded.push_str(&line[cursor..]);
        lines.push(expanded);
    }

    let mut output = lines.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}
