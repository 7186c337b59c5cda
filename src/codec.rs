//! URL query encoding of flat preview data.
//!
//! Only primitive values survive a trip through the URL. Decoding never adds
//! keys to the target and coerces each incoming string to the type the
//! target already holds at that key; a number that does not parse leaves the
//! old value in place.

use serde_json::{Map, Number, Value};
use url::form_urlencoded;

/// Query flag telling the preview page to render for the server.
pub const SERVER_FLAG: &str = "server";

/// Largest integer that survives an `f64` round trip.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Encodes the primitive entries of `data` as `?k=v&...`, or `""` when
/// nothing qualifies.
pub fn encode(data: &Map<String, Value>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (key, value) in data {
        if let Some(text) = primitive_text(value) {
            serializer.append_pair(key, &text);
            any = true;
        }
    }
    if any {
        format!("?{}", serializer.finish())
    } else {
        String::new()
    }
}

/// Applies `query` onto `target`, returning how many keys were updated.
pub fn decode(query: &str, target: &mut Map<String, Value>) -> usize {
    let query = query.strip_prefix('?').unwrap_or(query);
    let mut updated = 0;
    for (key, raw) in form_urlencoded::parse(query.as_bytes()) {
        let Some(current) = target.get_mut(&*key) else {
            continue;
        };
        let next = match current {
            Value::Number(_) => match parse_number(&raw) {
                Some(number) => Value::Number(number),
                None => continue,
            },
            Value::Bool(_) => Value::Bool(raw == "true"),
            _ => Value::String(raw.into_owned()),
        };
        *current = next;
        updated += 1;
    }
    updated
}

pub fn shareable_url(base_url: &str, data: &Map<String, Value>) -> String {
    format!("{base_url}{}", encode(data))
}

/// Path and query a server-side render fetches: the preview route for `id`
/// with the encoded data and `server=true` appended.
pub fn preview_path(route_prefix: &str, id: &str, data: &Map<String, Value>) -> String {
    let params = encode(data);
    let separator = if params.is_empty() { '?' } else { '&' };
    format!(
        "{}/{}{}{}{}=true",
        route_prefix.trim_end_matches('/'),
        id,
        params,
        separator,
        SERVER_FLAG
    )
}

pub fn preview_url(
    site_url: &str,
    route_prefix: &str,
    id: &str,
    data: &Map<String, Value>,
) -> String {
    format!(
        "{}{}",
        site_url.trim_end_matches('/'),
        preview_path(route_prefix, id, data)
    )
}

fn primitive_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(number_text(n)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn number_text(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER => format!("{}", f as i64),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

fn parse_number(raw: &str) -> Option<Number> {
    let trimmed = raw.trim();
    let parsed = if trimmed.is_empty() {
        0.0
    } else {
        trimmed.parse::<f64>().ok()?
    };
    if !parsed.is_finite() {
        return None;
    }
    if parsed.fract() == 0.0 && parsed.abs() <= MAX_SAFE_INTEGER {
        Some(Number::from(parsed as i64))
    } else {
        Number::from_f64(parsed)
    }
}
