//! Minimal path evaluation over `serde_json::Value`.
//!
//! Supports `$.a.b[0].c[2]` style paths: an optional leading `$`, dotted
//! property names and bracketed non-negative indices. Anything else
//! (wildcards, filters, quoted keys) simply fails to resolve.

use serde_json::Value;

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Key(&'a str),
    Index(usize),
}

/// Resolve `path` against `value`. Missing keys, out-of-range indices and
/// `null` intermediates all yield `None`.
pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse(path)?;
    let mut current = value;
    for segment in segments {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key)?,
            (Segment::Index(idx), Value::Array(items)) => items.get(idx)?,
            _ => return None,
        };
    }
    Some(current)
}

pub fn get_string<'a>(value: &'a Value, path: &str) -> Option<&'a str> {
    get(value, path)?.as_str()
}

pub fn get_number(value: &Value, path: &str) -> Option<f64> {
    match get(value, path)? {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

pub fn get_int(value: &Value, path: &str) -> Option<i64> {
    get(value, path)?.as_i64()
}

pub fn get_bool(value: &Value, path: &str) -> Option<bool> {
    get(value, path)?.as_bool()
}

pub fn get_array<'a>(value: &'a Value, path: &str) -> Option<&'a Vec<Value>> {
    get(value, path)?.as_array()
}

fn parse(path: &str) -> Option<Vec<Segment<'_>>> {
    let path = path.trim();
    let path = path.strip_prefix('$').unwrap_or(path);
    if path.is_empty() {
        return Some(Vec::new());
    }
    // `$[0]` and `$.a` are both valid starts
    let path = path.strip_prefix('.').unwrap_or(path);

    let mut segments = Vec::new();
    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => part.split_at(pos),
            None => (part, ""),
        };
        if key.is_empty() && rest.is_empty() {
            return None;
        }
        if !key.is_empty() {
            if key.contains(']') {
                return None;
            }
            segments.push(Segment::Key(key));
        }
        while !rest.is_empty() {
            let inner = rest.strip_prefix('[')?;
            let close = inner.find(']')?;
            let digits = &inner[..close];
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            segments.push(Segment::Index(digits.parse().ok()?));
            rest = &inner[close + 1..];
        }
    }
    Some(segments)
}
