//! Ordered capture-template rules for path and login classification.
//!
//! A rule pairs a slash-separated pattern with an output template. Pattern
//! segments may be literals, `*` (exactly one segment), `{name}` (exactly one
//! segment, captured), or a trailing `**` (any number of remaining segments,
//! including none). Matching is anchored and case-sensitive; rule order is
//! significant and the first matching rule wins.
//!
//! The module also provides the anchored glob used by the root-file,
//! generated-file, and bot pattern sets. Unlike shell globs, brackets are
//! literal characters so `*[bot]` matches logins ending in the literal
//! `[bot]` suffix.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A pattern-to-output mapping rule as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Slash-separated pattern, e.g. `backend/py/{name}/**`.
    pub pattern: String,
    /// Output template with `{name}` placeholders, e.g. `backend/py/{name}`.
    pub output: String,
}

/// One compiled pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Must equal this text exactly.
    Literal(String),
    /// Matches any single segment without capturing it.
    Any,
    /// Matches any single segment and captures it under the given name.
    Capture(String),
    /// Matches all remaining segments, including none. Always last.
    Rest,
}

/// A rule compiled into its segment form, ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    segments: Vec<Segment>,
    output: String,
}

impl CompiledRule {
    /// Compiles a configuration rule.
    ///
    /// A `**` segment anywhere but last would make the match ambiguous, so
    /// everything after the first `**` is ignored.
    #[must_use]
    pub fn compile(rule: &PatternRule) -> Self {
        let mut segments = Vec::new();
        for part in rule.pattern.split('/') {
            if part == "**" {
                segments.push(Segment::Rest);
                break;
            }
            if part == "*" {
                segments.push(Segment::Any);
                continue;
            }
            segments.push(
                capture_name(part).map_or_else(
                    || Segment::Literal(part.to_owned()),
                    |name| Segment::Capture(name.to_owned()),
                ),
            );
        }
        Self {
            segments,
            output: rule.output.clone(),
        }
    }

    /// Matches `input` against this rule, returning the substituted output
    /// template on success.
    ///
    /// Returns `None` when the input does not match or when the output
    /// template references a capture the pattern does not bind.
    #[must_use]
    pub fn apply(&self, input: &str) -> Option<String> {
        let captures = self.match_segments(input)?;
        substitute(&self.output, &captures)
    }

    fn match_segments(&self, input: &str) -> Option<HashMap<String, String>> {
        let mut captures = HashMap::new();
        let mut parts = input.split('/');

        for segment in &self.segments {
            match segment {
                Segment::Rest => return Some(captures),
                Segment::Literal(text) => {
                    if parts.next()? != text {
                        return None;
                    }
                }
                Segment::Any => {
                    parts.next()?;
                }
                Segment::Capture(name) => {
                    let value = parts.next()?;
                    captures.insert(name.clone(), value.to_owned());
                }
            }
        }

        // Anchored: without a trailing `**` the input must be fully consumed.
        if parts.next().is_some() {
            return None;
        }
        Some(captures)
    }
}

/// Returns the capture name when the segment has the form `{name}`.
fn capture_name(segment: &str) -> Option<&str> {
    let inner = segment.strip_prefix('{')?.strip_suffix('}')?;
    let valid = !inner.is_empty()
        && inner
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || character == '_');
    valid.then_some(inner)
}

/// Replaces `{name}` placeholders in `template` with captured values.
fn substitute(template: &str, captures: &HashMap<String, String>) -> Option<String> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let (head, tail) = rest.split_at(open);
        result.push_str(head);
        let after_brace = tail.get(1..)?;
        let close = after_brace.find('}')?;
        let name = after_brace.get(..close)?;
        result.push_str(captures.get(name)?);
        rest = after_brace.get(close + 1..)?;
    }
    result.push_str(rest);
    Some(result)
}

/// An ordered set of compiled rules with first-match-wins evaluation.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compiles configuration rules, preserving their order exactly.
    #[must_use]
    pub fn compile(rules: &[PatternRule]) -> Self {
        Self {
            rules: rules.iter().map(CompiledRule::compile).collect(),
        }
    }

    /// Returns the substituted output of the first rule matching `input`.
    #[must_use]
    pub fn first_match(&self, input: &str) -> Option<String> {
        self.rules.iter().find_map(|rule| rule.apply(input))
    }

    /// Returns true when no rules are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Anchored glob match where `*` matches any run of characters (including
/// separators), `?` matches one character, and all other characters —
/// brackets included — are literal.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    // Iterative wildcard matching with single-star backtracking.
    let mut pattern_index = 0;
    let mut text_index = 0;
    let mut star_pattern: Option<usize> = None;
    let mut star_text = 0;

    while text_index < text_chars.len() {
        let pattern_char = pattern_chars.get(pattern_index).copied();
        let text_char = text_chars.get(text_index).copied();

        match pattern_char {
            Some('*') => {
                star_pattern = Some(pattern_index);
                star_text = text_index;
                pattern_index += 1;
            }
            Some('?') => {
                pattern_index += 1;
                text_index += 1;
            }
            Some(literal) if Some(literal) == text_char => {
                pattern_index += 1;
                text_index += 1;
            }
            _ => match star_pattern {
                Some(star) => {
                    pattern_index = star + 1;
                    star_text += 1;
                    text_index = star_text;
                }
                None => return false,
            },
        }
    }

    // Remaining pattern may only contain `*`.
    pattern_chars
        .get(pattern_index..)
        .is_some_and(|tail| tail.iter().all(|&character| character == '*'))
}
