//! Parsing of action scripts into ordered, typed calls.
//!
//! A script is a flat sequence of `name(arg, arg, ...);` statements. There is
//! no expression grammar and no control flow: statements that do not match
//! the call shape, and calls named after a control-flow keyword, never enter
//! the call sequence. They are reported on a structured side channel instead
//! of vanishing, so callers can still diagnose a malformed script.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// Identifiers that look like calls in generated scripts but belong to
/// control structures the grammar does not support.
const RESERVED_WORDS: [&str; 4] = ["function", "while", "if", "for"];

static CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)\s*\((.*?)\)\s*;").expect("hard-coded call pattern"));

/// A single parsed call: an action name plus its positional arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionCall {
    pub name: String,
    pub args: Vec<ArgValue>,
}

/// A positional argument value. Conversion is total: every non-empty token
/// resolves to exactly one variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ArgValue {
    /// Numeric view of the value. Floats are truncated toward zero.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ArgValue::Int(v) => Some(*v),
            ArgValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Null => write!(f, "null"),
            ArgValue::Bool(v) => write!(f, "{v}"),
            ArgValue::Int(v) => write!(f, "{v}"),
            ArgValue::Float(v) => write!(f, "{v}"),
            ArgValue::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Why a statement was excluded from the call sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// The call identifier is a control-flow keyword.
    ReservedWord,
    /// The statement does not have the `name(args);` shape.
    Malformed,
}

/// A statement that was dropped during parsing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedStatement {
    pub text: String,
    pub reason: SkipReason,
}

/// Parse result: the ordered call sequence plus everything that was dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedScript {
    pub calls: Vec<ActionCall>,
    pub skipped: Vec<SkippedStatement>,
}

/// Parse script text into the ordered call sequence.
///
/// Dropped statements are collected rather than surfaced as errors; the run
/// policy is to continue past anything that does not parse.
pub fn parse_script(source: &str) -> ParsedScript {
    let mut calls = Vec::new();
    let mut skipped = Vec::new();
    let mut matched_spans: Vec<(usize, usize)> = Vec::new();

    for caps in CALL_RE.captures_iter(source) {
        let whole = caps.get(0).expect("capture group 0 always present");
        matched_spans.push((whole.start(), whole.end()));

        let name = &caps[1];
        if RESERVED_WORDS.contains(&name) {
            skipped.push(SkippedStatement {
                text: whole.as_str().trim().to_string(),
                reason: SkipReason::ReservedWord,
            });
            continue;
        }

        calls.push(ActionCall {
            name: name.to_string(),
            args: parse_arguments(&caps[2]),
        });
    }

    // Anything left over after removing the matched calls is text the grammar
    // could not interpret. Statement separators and block braces are noise;
    // segments with real content are reported as malformed.
    let mut residue = String::with_capacity(source.len());
    let mut cursor = 0;
    for (start, end) in matched_spans {
        residue.push_str(&source[cursor..start]);
        cursor = end;
    }
    residue.push_str(&source[cursor..]);

    for segment in residue.split(';') {
        let stmt = segment
            .trim()
            .trim_matches(|c: char| c == '{' || c == '}' || c.is_whitespace());
        if stmt.chars().any(|c| c.is_alphanumeric()) {
            skipped.push(SkippedStatement {
                text: stmt.to_string(),
                reason: SkipReason::Malformed,
            });
        }
    }

    ParsedScript { calls, skipped }
}

/// Split an argument list on commas that are not inside a quote pair, then
/// convert each token. Empty segments between commas are skipped.
fn parse_arguments(raw: &str) -> Vec<ArgValue> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in raw.chars() {
        match quote {
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            Some(q) if ch == q => {
                quote = None;
                current.push(ch);
            }
            None if ch == ',' => {
                if !current.trim().is_empty() {
                    args.push(convert_argument(current.trim()));
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        args.push(convert_argument(current.trim()));
    }

    args
}

/// Convert one trimmed token by fixed precedence: quoted string, null,
/// boolean, integer, float, opaque string.
fn convert_argument(token: &str) -> ArgValue {
    let bytes = token.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return ArgValue::Str(token[1..token.len() - 1].to_string());
        }
    }

    let lower = token.to_ascii_lowercase();
    if lower == "null" || lower == "none" {
        return ArgValue::Null;
    }
    if lower == "true" {
        return ArgValue::Bool(true);
    }
    if lower == "false" {
        return ArgValue::Bool(false);
    }

    if is_integer_token(token) {
        if let Ok(v) = token.parse::<i64>() {
            return ArgValue::Int(v);
        }
    }
    if let Ok(v) = token.parse::<f64>() {
        return ArgValue::Float(v);
    }

    ArgValue::Str(token.to_string())
}

fn is_integer_token(token: &str) -> bool {
    let digits = token
        .strip_prefix('-')
        .or_else(|| token.strip_prefix('+'))
        .unwrap_or(token);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_calls_in_order() {
        let parsed = parse_script("click(100,200);\ntext(\"Hello World\");\n");
        assert_eq!(
            parsed.calls,
            vec![
                ActionCall {
                    name: "click".into(),
                    args: vec![ArgValue::Int(100), ArgValue::Int(200)],
                },
                ActionCall {
                    name: "text".into(),
                    args: vec![ArgValue::Str("Hello World".into())],
                },
            ]
        );
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn argument_conversion_precedence() {
        let parsed = parse_script("probe('quoted', null, NONE, true, False, -42, 3.5, raw_token);");
        assert_eq!(
            parsed.calls[0].args,
            vec![
                ArgValue::Str("quoted".into()),
                ArgValue::Null,
                ArgValue::Null,
                ArgValue::Bool(true),
                ArgValue::Bool(false),
                ArgValue::Int(-42),
                ArgValue::Float(3.5),
                ArgValue::Str("raw_token".into()),
            ]
        );
    }

    #[test]
    fn quoted_commas_do_not_split() {
        let parsed = parse_script("text(\"a, b\", 'c,d');");
        assert_eq!(
            parsed.calls[0].args,
            vec![ArgValue::Str("a, b".into()), ArgValue::Str("c,d".into())]
        );
    }

    #[test]
    fn empty_segments_are_skipped() {
        let parsed = parse_script("click(1,,2);");
        assert_eq!(
            parsed.calls[0].args,
            vec![ArgValue::Int(1), ArgValue::Int(2)]
        );
    }

    #[test]
    fn no_arguments() {
        let parsed = parse_script("press_home();");
        assert_eq!(parsed.calls[0].name, "press_home");
        assert!(parsed.calls[0].args.is_empty());
    }

    #[test]
    fn reserved_words_are_dropped_with_reason() {
        let parsed = parse_script("while(true);\nclick(1,2);");
        assert_eq!(parsed.calls.len(), 1);
        assert_eq!(parsed.calls[0].name, "click");
        assert_eq!(parsed.skipped.len(), 1);
        assert_eq!(parsed.skipped[0].reason, SkipReason::ReservedWord);
    }

    #[test]
    fn calls_inside_control_blocks_still_parse() {
        let parsed = parse_script("function run() {\n  click(5,6);\n}\n");
        assert_eq!(parsed.calls.len(), 1);
        assert_eq!(parsed.calls[0].name, "click");
        // The wrapper itself is reported as malformed residue.
        assert!(parsed
            .skipped
            .iter()
            .any(|s| s.reason == SkipReason::Malformed));
    }

    #[test]
    fn malformed_statements_are_reported() {
        let parsed = parse_script("not a call at all;\nclick(1,2);");
        assert_eq!(parsed.calls.len(), 1);
        assert_eq!(parsed.skipped.len(), 1);
        assert_eq!(parsed.skipped[0].reason, SkipReason::Malformed);
        assert_eq!(parsed.skipped[0].text, "not a call at all");
    }

    #[test]
    fn parentheses_inside_quotes() {
        let parsed = parse_script("text(\"hi (there)\");");
        assert_eq!(
            parsed.calls[0].args,
            vec![ArgValue::Str("hi (there)".into())]
        );
    }

    #[test]
    fn arg_values_serialize_as_json_natives() {
        let args = vec![
            ArgValue::Null,
            ArgValue::Bool(true),
            ArgValue::Int(7),
            ArgValue::Str("x".into()),
        ];
        let json = serde_json::to_string(&args).expect("serializable");
        assert_eq!(json, "[null,true,7,\"x\"]");
    }
}
