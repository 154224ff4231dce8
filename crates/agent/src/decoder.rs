//! Incremental decoding of a structured response stream.
//!
//! The backend emits token deltas; taken together they will eventually
//! form one JSON object, but any prefix of that object is almost never
//! valid JSON on its own. [`StreamDecoder`] buffers the deltas, closes
//! the buffer into a best-effort value with a tolerant parser, validates
//! it against the aligned schema, and surfaces each new distinct snapshot
//! exactly once.

use serde_json::{Map, Number, Value};
use tracing::trace;
use turnwise_core::error::{Error, Result};
use turnwise_core::response::AgentResponse;

use crate::validate::validate;

/// Parse a prefix of a JSON document, implicitly closing whatever is
/// still open at the end of the input.
///
/// Truncation is tolerated everywhere: unclosed objects and arrays,
/// strings cut mid-escape, dangling literals and numbers. Input that is
/// malformed rather than merely truncated returns `None`.
pub(crate) fn parse_partial(text: &str) -> Option<Value> {
    let chars: Vec<char> = text.chars().collect();
    let mut parser = Parser { chars: &chars, pos: 0 };
    parser.skip_ws();
    if parser.eof() {
        return None;
    }
    parser.parse_value()
}

struct Parser<'a> {
    chars: &'a [char],
    pos: usize,
}

impl Parser<'_> {
    fn eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_value(&mut self) -> Option<Value> {
        match self.peek()? {
            '{' => self.parse_object(),
            '[' => self.parse_array(),
            '"' => self.parse_string().map(|(s, _)| Value::String(s)),
            't' => self.parse_literal("true", Value::Bool(true)),
            'f' => self.parse_literal("false", Value::Bool(false)),
            'n' => self.parse_literal("null", Value::Null),
            c if c == '-' || c.is_ascii_digit() => self.parse_number(),
            _ => None,
        }
    }

    fn parse_object(&mut self) -> Option<Value> {
        self.bump(); // '{'
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Some(Value::Object(map)),
                Some('}') => {
                    self.bump();
                    return Some(Value::Object(map));
                }
                Some(',') => {
                    self.bump();
                    continue;
                }
                Some('"') => {}
                Some(_) => return None,
            }
            let (key, terminated) = self.parse_string()?;
            if !terminated {
                // key still streaming in; hold it back entirely
                return Some(Value::Object(map));
            }
            self.skip_ws();
            match self.peek() {
                None => return Some(Value::Object(map)),
                Some(':') => {
                    self.bump();
                }
                Some(_) => return None,
            }
            self.skip_ws();
            if self.eof() {
                return Some(Value::Object(map));
            }
            let value = self.parse_value()?;
            map.insert(key, value);
        }
    }

    fn parse_array(&mut self) -> Option<Value> {
        self.bump(); // '['
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Some(Value::Array(items)),
                Some(']') => {
                    self.bump();
                    return Some(Value::Array(items));
                }
                Some(',') => {
                    self.bump();
                    continue;
                }
                Some(_) => {}
            }
            let item = self.parse_value()?;
            items.push(item);
        }
    }

    /// Returns the string content and whether the closing quote was seen.
    /// An incomplete trailing escape is dropped from the content so the
    /// decoded text only ever grows by appending.
    fn parse_string(&mut self) -> Option<(String, bool)> {
        self.bump(); // '"'
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Some((out, false)),
                Some('"') => return Some((out, true)),
                Some('\\') => match self.bump() {
                    None => return Some((out, false)),
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('/') => out.push('/'),
                    Some('b') => out.push('\u{0008}'),
                    Some('f') => out.push('\u{000C}'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('u') => match self.parse_unicode_escape() {
                        UnicodeEscape::Char(c) => out.push(c),
                        UnicodeEscape::Truncated => return Some((out, false)),
                        UnicodeEscape::Invalid => return None,
                    },
                    Some(_) => return None,
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn parse_unicode_escape(&mut self) -> UnicodeEscape {
        let Some(first) = self.parse_hex4() else {
            return UnicodeEscape::Truncated;
        };
        let first = match first {
            Ok(n) => n,
            Err(()) => return UnicodeEscape::Invalid,
        };
        if (0xD800..0xDC00).contains(&first) {
            // high surrogate; needs a \uXXXX partner
            if self.eof() {
                return UnicodeEscape::Truncated;
            }
            if self.bump() != Some('\\') {
                return UnicodeEscape::Invalid;
            }
            if self.eof() {
                return UnicodeEscape::Truncated;
            }
            if self.bump() != Some('u') {
                return UnicodeEscape::Invalid;
            }
            let Some(second) = self.parse_hex4() else {
                return UnicodeEscape::Truncated;
            };
            let second = match second {
                Ok(n) => n,
                Err(()) => return UnicodeEscape::Invalid,
            };
            if !(0xDC00..0xE000).contains(&second) {
                return UnicodeEscape::Invalid;
            }
            let combined = 0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00);
            match char::from_u32(combined) {
                Some(c) => UnicodeEscape::Char(c),
                None => UnicodeEscape::Invalid,
            }
        } else {
            match char::from_u32(first) {
                Some(c) => UnicodeEscape::Char(c),
                None => UnicodeEscape::Invalid,
            }
        }
    }

    /// `None` means truncated, `Some(Err(()))` means a non-hex digit.
    fn parse_hex4(&mut self) -> Option<std::result::Result<u32, ()>> {
        let mut n = 0u32;
        for _ in 0..4 {
            let c = self.bump()?;
            let digit = match c.to_digit(16) {
                Some(d) => d,
                None => return Some(Err(())),
            };
            n = n * 16 + digit;
        }
        Some(Ok(n))
    }

    fn parse_literal(&mut self, word: &str, value: Value) -> Option<Value> {
        for expected in word.chars() {
            match self.bump() {
                None => return Some(value), // truncated literal
                Some(c) if c == expected => {}
                Some(_) => return None,
            }
        }
        Some(value)
    }

    fn parse_number(&mut self) -> Option<Value> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                text.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        // drop a dangling exponent or decimal point left by truncation
        while text.ends_with(['.', 'e', 'E', '+', '-']) {
            text.pop();
        }
        if text.is_empty() {
            return Some(Value::Null);
        }
        text.parse::<Number>().ok().map(Value::Number)
    }
}

enum UnicodeEscape {
    Char(char),
    Truncated,
    Invalid,
}

/// Accumulates stream deltas and yields validated, deduplicated
/// response snapshots.
pub struct StreamDecoder {
    schema: Value,
    buffer: String,
    last: Option<AgentResponse>,
}

impl StreamDecoder {
    pub fn new(schema: Value) -> Self {
        Self { schema, buffer: String::new(), last: None }
    }

    /// Feed one delta. Returns `Ok(Some(..))` only when the buffer closes
    /// into a new snapshot that validates against the schema and differs
    /// from the previous one.
    ///
    /// The one hard failure is a shrinking `msg_to_user`: partial text
    /// from a snapshot may already have been shown to the user, so text
    /// that stops being a prefix extension cannot be reconciled.
    pub fn feed(&mut self, delta: &str) -> Result<Option<AgentResponse>> {
        if delta.is_empty() {
            return Ok(None);
        }
        self.buffer.push_str(delta);

        let Some(value) = parse_partial(&self.buffer) else {
            return Ok(None);
        };
        if !validate(&value, &self.schema) {
            trace!(buffered = self.buffer.len(), "snapshot rejected by schema");
            return Ok(None);
        }
        let Ok(snapshot) = serde_json::from_value::<AgentResponse>(value) else {
            return Ok(None);
        };

        if let (Some(previous), Some(current)) = (
            self.last.as_ref().and_then(|r| r.msg_to_user.as_deref()),
            snapshot.msg_to_user.as_deref(),
        ) {
            if !previous.is_empty() && !current.starts_with(previous) {
                return Err(Error::NonMonotonicStream(format!(
                    "user message regressed from {previous:?} to {current:?}"
                )));
            }
        }

        if self.last.as_ref() == Some(&snapshot) {
            return Ok(None);
        }
        self.last = Some(snapshot.clone());
        Ok(Some(snapshot))
    }

    pub fn last(&self) -> Option<&AgentResponse> {
        self.last.as_ref()
    }

    /// The final decoded response, once the stream has ended.
    pub fn into_last(self) -> Option<AgentResponse> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use turnwise_core::response::AgentResponse;

    fn open_schema() -> Value {
        json!({ "type": "object" })
    }

    #[test]
    fn partial_object_closes_cleanly() {
        assert_eq!(parse_partial(r#"{"a": 1, "b""#), Some(json!({ "a": 1 })));
        assert_eq!(parse_partial(r#"{"a": 1, "b":"#), Some(json!({ "a": 1 })));
        assert_eq!(parse_partial(r#"{"a": {"b": ["#), Some(json!({ "a": { "b": [] } })));
    }

    #[test]
    fn partial_string_values_are_kept() {
        assert_eq!(parse_partial(r#"{"a": "hel"#), Some(json!({ "a": "hel" })));
        assert_eq!(parse_partial(r#"["x", "y"#), Some(json!(["x", "y"])));
    }

    #[test]
    fn truncated_escapes_are_held_back() {
        assert_eq!(parse_partial(r#"{"a": "he\"#), Some(json!({ "a": "he" })));
        assert_eq!(parse_partial(r#"{"a": "he\u00"#), Some(json!({ "a": "he" })));
        assert_eq!(parse_partial(r#"{"a": "he\n"#), Some(json!({ "a": "he\n" })));
        assert_eq!(parse_partial(r#"{"a": "he\ud83d"#), Some(json!({ "a": "he" })));
        assert_eq!(
            parse_partial(r#"{"a": "he😀"#),
            Some(json!({ "a": "he\u{1F600}" }))
        );
    }

    #[test]
    fn truncated_literals_and_numbers() {
        assert_eq!(parse_partial(r#"{"a": tru"#), Some(json!({ "a": true })));
        assert_eq!(parse_partial(r#"{"a": nul"#), Some(json!({ "a": null })));
        assert_eq!(parse_partial(r#"{"a": 12"#), Some(json!({ "a": 12 })));
        assert_eq!(parse_partial(r#"{"a": 1.5e"#), Some(json!({ "a": 1.5 })));
        assert_eq!(parse_partial(r#"{"a": -"#), Some(json!({ "a": null })));
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert_eq!(parse_partial("hello"), None);
        assert_eq!(parse_partial(r#"{"a": trux}"#), None);
        assert_eq!(parse_partial(r#"{"a" 1}"#), None);
        assert_eq!(parse_partial(r#"{"a": "b\q"}"#), None);
        assert_eq!(parse_partial(""), None);
    }

    #[test]
    fn complete_documents_parse_exactly() {
        assert_eq!(
            parse_partial(r#"{"a": [1, 2], "b": "x"}"#),
            Some(json!({ "a": [1, 2], "b": "x" }))
        );
    }

    #[test]
    fn decoder_yields_progressive_snapshots() {
        let mut decoder = StreamDecoder::new(open_schema());
        let first = decoder.feed(r#"{"msg_to_user": "He"#).unwrap().unwrap();
        assert_eq!(first.msg_to_user.as_deref(), Some("He"));

        let second = decoder.feed("llo").unwrap().unwrap();
        assert_eq!(second.msg_to_user.as_deref(), Some("Hello"));

        // closing the document repeats the same logical value
        assert!(decoder.feed(r#""}"#).unwrap().is_none());
        assert_eq!(decoder.into_last().unwrap().msg_to_user.as_deref(), Some("Hello"));
    }

    #[test]
    fn empty_and_unparseable_deltas_yield_nothing() {
        let mut decoder = StreamDecoder::new(open_schema());
        assert!(decoder.feed("").unwrap().is_none());
        assert!(decoder.feed("garbage").unwrap().is_none());
        assert!(decoder.last().is_none());
    }

    #[test]
    fn snapshots_failing_validation_are_suppressed() {
        let schema = json!({
            "type": "object",
            "properties": { "msg_to_user": { "const": "ok" } },
        });
        let mut decoder = StreamDecoder::new(schema);
        assert!(decoder.feed(r#"{"msg_to_user": "nope"}"#).unwrap().is_none());
        assert!(decoder.feed(r#" "#).unwrap().is_none());
        assert!(decoder.last().is_none());
    }

    #[test]
    fn regressing_user_message_is_fatal() {
        let mut decoder = StreamDecoder::new(open_schema());
        decoder.last = Some(AgentResponse {
            msg_to_user: Some("Hello there".into()),
            ..AgentResponse::default()
        });
        let err = decoder.feed(r#"{"msg_to_user": "Good"#).unwrap_err();
        assert!(matches!(err, Error::NonMonotonicStream(_)));
    }

    #[test]
    fn action_snapshots_decode_through_the_response_type() {
        let mut decoder = StreamDecoder::new(open_schema());
        let snapshot = decoder
            .feed(r#"{"thought": "look it up", "action": {"tool_name": "search", "arguments": {"q": "rust"}}}"#)
            .unwrap()
            .unwrap();
        let action = snapshot.action.unwrap();
        assert_eq!(action.tool_name, "search");
        assert_eq!(action.arguments, json!({ "q": "rust" }));
    }
}
