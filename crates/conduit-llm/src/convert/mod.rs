//! Bidirectional conversion between canonical types and wire formats
//!
//! Each vendor submodule handles one protocol; `media` and `schema` are
//! shared helpers.

pub mod anthropic;
pub mod gemini;
pub mod media;
pub mod openai;
pub mod schema;

/// What to do with a tool call that has no reply before the next turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrphanToolCallPolicy {
    /// Insert an empty reply so the vendor sees every call answered
    #[default]
    SynthesizeEmptyReply,
    /// Send the history as-is
    Preserve,
}

/// Options shared by the request converters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionOptions {
    /// Handling of unanswered tool calls
    pub orphan_tool_calls: OrphanToolCallPolicy,
}

/// Combine the two reasoning aliases a vendor may send
///
/// Empty strings count as absent. Identical values are kept once;
/// differing values are concatenated in argument order.
pub(crate) fn join_reasoning(primary: Option<String>, alias: Option<String>) -> Option<String> {
    let primary = primary.filter(|text| !text.is_empty());
    let alias = alias.filter(|text| !text.is_empty());

    match (primary, alias) {
        (Some(a), Some(b)) if a == b => Some(a),
        (Some(a), Some(b)) => Some(a + &b),
        (a, b) => a.or(b),
    }
}

/// Append reasoning from a later part or turn
pub(crate) fn append_reasoning(existing: Option<String>, next: Option<String>) -> Option<String> {
    match (existing, next.filter(|text| !text.is_empty())) {
        (Some(a), Some(b)) => Some(a + &b),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasoning_aliases() {
        let s = |text: &str| Some(text.to_owned());

        assert_eq!(join_reasoning(s("a"), s("a")), s("a"));
        assert_eq!(join_reasoning(s("a"), s("b")), s("ab"));
        assert_eq!(join_reasoning(None, s("b")), s("b"));
        assert_eq!(join_reasoning(s(""), s("b")), s("b"));
        assert_eq!(join_reasoning(s(""), None), None);
    }

    #[test]
    fn appended_reasoning_keeps_repeats() {
        let s = |text: &str| Some(text.to_owned());

        assert_eq!(append_reasoning(s("x"), s("x")), s("xx"));
        assert_eq!(append_reasoning(None, s("")), None);
    }
}
