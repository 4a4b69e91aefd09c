//! Declarative patch rules.
//!
//! A [`PatchRule`] pairs a matcher (literal substring or regular expression)
//! with a replacement and an optional content [`Guard`]. All rule application
//! goes through [`PatchRule::apply`]; nothing else in the crate rewrites text.

use regex::Regex;
use serde::Deserialize;
use std::fmt;
use tracing::debug;

/// How many regex matches a rule rewrites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// Only the first match (e.g. the first `import` statement in a file)
    First,
    /// Every non-overlapping match
    #[default]
    All,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::First => write!(f, "first"),
            Scope::All => write!(f, "all"),
        }
    }
}

/// What a rule searches for.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Exact substring; every non-overlapping occurrence is replaced.
    Literal(String),
    /// Regular expression; the replacement is a template (`$1`, `${name}`).
    Regex { regex: Regex, scope: Scope },
}

impl Matcher {
    /// Count the matches this matcher would rewrite in `text`.
    fn count(&self, text: &str) -> usize {
        match self {
            Matcher::Literal(search) => text.matches(search.as_str()).count(),
            Matcher::Regex { regex, scope } => match scope {
                Scope::First => usize::from(regex.is_match(text)),
                Scope::All => regex.find_iter(text).count(),
            },
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Literal(search) => write!(f, "literal {search:?}"),
            Matcher::Regex { regex, scope } => write!(f, "regex /{}/ ({scope})", regex.as_str()),
        }
    }
}

/// Content precondition evaluated against the current buffer before a rule runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Guard {
    /// Skip the rule if any of these substrings is present
    pub unless_contains: Vec<String>,
    /// Skip the rule unless all of these substrings are present
    pub only_if_contains: Vec<String>,
}

impl Guard {
    pub fn allows(&self, text: &str) -> bool {
        self.unless_contains
            .iter()
            .all(|needle| !text.contains(needle.as_str()))
            && self
                .only_if_contains
                .iter()
                .all(|needle| text.contains(needle.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.unless_contains.is_empty() && self.only_if_contains.is_empty()
    }
}

/// A matcher/replacement pair applied to file text.
#[derive(Debug, Clone)]
pub struct PatchRule {
    pub matcher: Matcher,
    pub replacement: String,
    pub guard: Guard,
}

/// Output of a single rule over a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleApplication {
    pub text: String,
    /// Number of matches rewritten (0 when the guard skipped the rule)
    pub hits: usize,
}

impl PatchRule {
    /// Literal substring rule.
    pub fn literal(search: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            matcher: Matcher::Literal(search.into()),
            replacement: replacement.into(),
            guard: Guard::default(),
        }
    }

    /// Regular-expression rule. Fails if `pattern` does not compile.
    pub fn regex(
        pattern: &str,
        replacement: impl Into<String>,
        scope: Scope,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            matcher: Matcher::Regex {
                regex: Regex::new(pattern)?,
                scope,
            },
            replacement: replacement.into(),
            guard: Guard::default(),
        })
    }

    /// Skip this rule when `needle` is already in the buffer.
    pub fn unless_contains(mut self, needle: impl Into<String>) -> Self {
        self.guard.unless_contains.push(needle.into());
        self
    }

    /// Run this rule only when `needle` is in the buffer.
    pub fn only_if_contains(mut self, needle: impl Into<String>) -> Self {
        self.guard.only_if_contains.push(needle.into());
        self
    }

    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guard = guard;
        self
    }

    /// Apply this rule to `text`.
    ///
    /// A matcher absent from the text is a no-op, not an error.
    pub fn apply(&self, text: &str) -> RuleApplication {
        if !self.guard.allows(text) {
            debug!(rule = %self.matcher, "guard rejected buffer, skipping rule");
            return RuleApplication {
                text: text.to_string(),
                hits: 0,
            };
        }

        let hits = self.matcher.count(text);
        if hits == 0 {
            debug!(rule = %self.matcher, "no matches");
            return RuleApplication {
                text: text.to_string(),
                hits,
            };
        }

        let text = match &self.matcher {
            Matcher::Literal(search) => text.replace(search.as_str(), &self.replacement),
            Matcher::Regex { regex, scope } => match scope {
                Scope::First => regex.replacen(text, 1, self.replacement.as_str()),
                Scope::All => regex.replace_all(text, self.replacement.as_str()),
            }
            .into_owned(),
        };

        debug!(rule = %self.matcher, hits, "rule applied");
        RuleApplication { text, hits }
    }
}

/// Apply `rules` left-to-right over a single buffer.
///
/// Returns the final text and the per-rule hit counts, in rule order.
pub fn apply_rules(text: &str, rules: &[PatchRule]) -> (String, Vec<usize>) {
    let mut buffer = text.to_string();
    let mut hits = Vec::with_capacity(rules.len());

    for rule in rules {
        let applied = rule.apply(&buffer);
        buffer = applied.text;
        hits.push(applied.hits);
    }

    (buffer, hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_replaces_every_occurrence() {
        let rule = PatchRule::literal("foo", "bar");
        let result = rule.apply("foo foo foo");
        assert_eq!(result.text, "bar bar bar");
        assert_eq!(result.hits, 3);
    }

    #[test]
    fn test_literal_absent_is_noop() {
        let rule = PatchRule::literal("missing", "present");
        let result = rule.apply("nothing here");
        assert_eq!(result.text, "nothing here");
        assert_eq!(result.hits, 0);
    }

    #[test]
    fn test_literal_import_insertion() {
        let rule = PatchRule::literal("import { useEffect }", "import { useEffect, useCallback }");
        let result = rule.apply("import { useEffect } from 'react';");
        assert_eq!(result.text, "import { useEffect, useCallback } from 'react';");
        assert_eq!(result.text.matches("useCallback").count(), 1);
    }

    #[test]
    fn test_regex_first_scope() {
        let rule = PatchRule::regex(r"import \{ (\w+) \}", "import { $1, useCallback }", Scope::First)
            .unwrap();
        let text = "import { a }\nimport { b }\n";
        let result = rule.apply(text);
        assert_eq!(result.text, "import { a, useCallback }\nimport { b }\n");
        assert_eq!(result.hits, 1);
    }

    #[test]
    fn test_regex_all_scope() {
        let rule = PatchRule::regex(r"\}, \[\]\);", "}, [deps]);", Scope::All).unwrap();
        let result = rule.apply("}, []);\n}, []);\n");
        assert_eq!(result.text, "}, [deps]);\n}, [deps]);\n");
        assert_eq!(result.hits, 2);
    }

    #[test]
    fn test_regex_named_capture_template() {
        let rule = PatchRule::regex(
            r"\}, \[(?P<deps>[^\]]*)\]\);",
            "}, [${deps}, loadComments]);",
            Scope::All,
        )
        .unwrap();
        let result = rule.apply("  }, [article.id]);");
        assert_eq!(result.text, "  }, [article.id, loadComments]);");
    }

    #[test]
    fn test_invalid_regex_rejected() {
        assert!(PatchRule::regex(r"(unclosed", "", Scope::All).is_err());
    }

    #[test]
    fn test_unless_contains_guard() {
        let rule = PatchRule::literal("import { useEffect", "import { useEffect, useCallback")
            .unless_contains("useCallback");
        let already = "import { useEffect, useCallback } from 'react';";
        let result = rule.apply(already);
        assert_eq!(result.text, already);
        assert_eq!(result.hits, 0);
    }

    #[test]
    fn test_only_if_contains_guard() {
        let rule = PatchRule::literal("a", "b").only_if_contains("marker");
        assert_eq!(rule.apply("a").text, "a");
        assert_eq!(rule.apply("a marker").text, "b marker");
    }

    #[test]
    fn test_apply_rules_composes_left_to_right() {
        let rules = vec![
            PatchRule::literal("one", "two"),
            PatchRule::literal("two", "three"),
        ];
        let (text, hits) = apply_rules("one", &rules);
        assert_eq!(text, "three");
        assert_eq!(hits, vec![1, 1]);
    }

    #[test]
    fn test_guard_sees_previous_rule_output() {
        // else-if chain: second rule must not fire once the first inserted the symbol
        let rules = vec![
            PatchRule::literal("import { useState, useEffect", "import { useState, useEffect, useCallback")
                .unless_contains("useCallback"),
            PatchRule::literal("import { useEffect", "import { useEffect, useCallback")
                .unless_contains("useCallback")
                .unless_contains("useState"),
        ];
        let (text, hits) = apply_rules("import { useState, useEffect } from 'react';", &rules);
        assert_eq!(text, "import { useState, useEffect, useCallback } from 'react';");
        assert_eq!(hits, vec![1, 0]);
    }

    #[test]
    fn test_apply_rules_empty() {
        let (text, hits) = apply_rules("unchanged", &[]);
        assert_eq!(text, "unchanged");
        assert!(hits.is_empty());
    }
}
