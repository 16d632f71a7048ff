//! The textual map syntax: `{k1=v1,k2=v2}`.
//!
//! Parsing is permissive and never fails: malformed pairs degrade to
//! something sensible rather than raising. Outer braces are optional,
//! separators inside `"`-enclosed tokens are literal, and `""` inside an
//! enclosure is an escaped quote.
//!
//! ```
//! use rowmap::value::{Value, text};
//!
//! let map = text::parse_map(Some(r#"{"a,b"="c=d"}"#)).unwrap();
//! assert_eq!(map.get(&Value::from("a,b")), Some(&Value::from("c=d")));
//! ```

use super::map::MapValue;
use super::Value;

const QUOTE: char = '"';
const PAIR_SEPARATOR: char = ',';
const KEY_VALUE_SEPARATOR: char = '=';

/// Split `input` on `delimiter`, ignoring delimiters inside quotes.
///
/// Tokens are returned as written, quotes included.
pub fn split_quoted(input: &str, delimiter: char) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in input.chars() {
        if c == QUOTE {
            quoted = !quoted;
        }
        if c == delimiter && !quoted {
            tokens.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    tokens.push(current);
    tokens
}

/// Trim a token and remove one pair of enclosing quotes, unescaping `""`.
pub fn unquote(token: &str) -> String {
    let trimmed = token.trim();
    match trimmed
        .strip_prefix(QUOTE)
        .and_then(|rest| rest.strip_suffix(QUOTE))
    {
        Some(inner) => inner.replace("\"\"", "\""),
        None => trimmed.to_string(),
    }
}

/// Quote a token if parsing it back would otherwise change it.
pub fn quote_token(token: &str) -> String {
    let needs_quotes = token.trim() != token
        || token
            .chars()
            .any(|c| matches!(c, ',' | '=' | '"' | '{' | '}'));
    if needs_quotes {
        format!("\"{}\"", token.replace('"', "\"\""))
    } else {
        token.to_string()
    }
}

fn strip_braces(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .unwrap_or(trimmed)
}

/// Parse the textual map form.
///
/// `None` parses to `None`, never to an empty map. A pair without `=` gets
/// an empty value, blank pairs are skipped, and segments after the second
/// unquoted `=` are ignored. Keys and values are text; a repeated key keeps
/// its last value.
pub fn parse_map(text: Option<&str>) -> Option<MapValue> {
    let body = strip_braces(text?);
    let mut map = MapValue::new();
    for pair in split_quoted(body, PAIR_SEPARATOR) {
        if pair.trim().is_empty() {
            continue;
        }
        let mut segments = split_quoted(&pair, KEY_VALUE_SEPARATOR).into_iter();
        let key = segments.next().map(|k| unquote(&k)).unwrap_or_default();
        let value = segments.next().map(|v| unquote(&v)).unwrap_or_default();
        map.insert(key, value);
    }
    Some(map)
}

/// Render a map in the textual form: `key=value` pairs joined by `,`,
/// without braces. Null keys or values render as empty tokens.
pub fn render_map(map: &MapValue) -> String {
    map.iter()
        .map(|(k, v)| format!("{}={}", render_token(k), render_token(v)))
        .collect::<Vec<_>>()
        .join(",")
}

fn render_token(value: &Value) -> String {
    value
        .to_text()
        .map(|text| quote_token(&text))
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn entry<'m>(map: &'m MapValue, key: &str) -> Option<&'m str> {
        map.get(&Value::from(key)).and_then(Value::as_str)
    }

    #[test]
    fn test_parse_with_and_without_braces() {
        let braced = parse_map(Some("{a=1,b=2}")).unwrap();
        let bare = parse_map(Some(" a = 1 , b = 2 ")).unwrap();
        assert_eq!(braced, bare);
        assert_eq!(braced.len(), 2);
        assert_eq!(entry(&braced, "a"), Some("1"));
        assert_eq!(entry(&braced, "b"), Some("2"));
    }

    #[test]
    fn test_parse_quoted_separators() {
        let map = parse_map(Some(r#"{"a,b"="c=d"}"#)).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(entry(&map, "a,b"), Some("c=d"));
    }

    #[test]
    fn test_parse_escaped_quote() {
        let map = parse_map(Some(r#""say ""hi"""=x"#)).unwrap();
        assert_eq!(entry(&map, r#"say "hi""#), Some("x"));
    }

    #[test]
    fn test_parse_missing_value_is_empty() {
        let map = parse_map(Some("{a}")).unwrap();
        assert_eq!(entry(&map, "a"), Some(""));
    }

    #[test]
    fn test_parse_extra_segments_ignored() {
        let map = parse_map(Some("a=1=2")).unwrap();
        assert_eq!(entry(&map, "a"), Some("1"));
    }

    #[test]
    fn test_parse_blank_input_and_pairs() {
        assert_eq!(parse_map(Some("")), Some(MapValue::new()));
        assert_eq!(parse_map(Some("{ }")), Some(MapValue::new()));
        assert_eq!(parse_map(Some("a=1,,b=2")).map(|m| m.len()), Some(2));
    }

    #[test]
    fn test_parse_null_is_null() {
        assert_eq!(parse_map(None), None);
    }

    #[test]
    fn test_parse_last_write_wins() {
        let map = parse_map(Some("k=1,k=2")).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(entry(&map, "k"), Some("2"));
    }

    #[test]
    fn test_split_keeps_quotes() {
        assert_eq!(
            split_quoted(r#"a,"b,c",d"#, ','),
            vec!["a", r#""b,c""#, "d"]
        );
        assert_eq!(split_quoted("", ','), vec![""]);
    }

    #[test]
    fn test_quote_token() {
        assert_eq!(quote_token("plain"), "plain");
        assert_eq!(quote_token("a,b"), r#""a,b""#);
        assert_eq!(quote_token(" pad"), r#"" pad""#);
        assert_eq!(quote_token(r#"q"t"#), r#""q""t""#);
    }

    #[test]
    fn test_render_then_parse_tricky_tokens() {
        let original: MapValue = [
            ("a,b", "c=d"),
            ("{brace}", " padded "),
            ("quote\"d", ""),
            ("", "empty key"),
        ]
        .into_iter()
        .collect();
        let rendered = render_map(&original);
        assert_eq!(parse_map(Some(&rendered)), Some(original));
    }

    #[test]
    fn test_render_single_entry() {
        let map: MapValue = [("k", "v")].into_iter().collect();
        assert_eq!(render_map(&map), "k=v");
        assert_eq!(render_map(&MapValue::new()), "");
    }
}
