use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Walk object keys; keys may contain `/` or `.` (labels, annotations).
pub fn lookup<'a>(v: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut cur = v;
    for key in path {
        cur = cur.as_object()?.get(*key)?;
    }
    Some(cur)
}

/// Non-empty string at `path`.
pub fn str_at<'a>(v: &'a Value, path: &[&str]) -> Option<&'a str> {
    lookup(v, path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

pub fn string_or_default(v: &Value, path: &[&str]) -> String {
    str_at(v, path).unwrap_or_default().to_string()
}

/// Integers, floats and numeric strings (`"45"`, `"45%"`) all count.
pub fn int_at(v: &Value, path: &[&str]) -> Option<i64> {
    match lookup(v, path)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

pub fn bool_at(v: &Value, path: &[&str]) -> Option<bool> {
    lookup(v, path).and_then(Value::as_bool)
}

/// Set `path` to `new`, creating intermediate objects and replacing
/// non-object values found on the way.
pub fn set_path(v: &mut Value, path: &[&str], new: Value) {
    let Some((last, parents)) = path.split_last() else {
        *v = new;
        return;
    };
    let mut cur = v;
    for key in parents {
        if !cur.is_object() {
            *cur = Value::Object(Map::new());
        }
        let Value::Object(m) = cur else {
            return;
        };
        cur = m.entry(key.to_string()).or_insert(Value::Null);
    }
    if !cur.is_object() {
        *cur = Value::Object(Map::new());
    }
    if let Some(m) = cur.as_object_mut() {
        m.insert(last.to_string(), new);
    }
}

pub fn name_of(v: &Value) -> String {
    string_or_default(v, &["metadata", "name"])
}

pub fn label_of(v: &Value, key: &str) -> Option<String> {
    str_at(v, &["metadata", "labels", key]).map(str::to_string)
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

pub fn parse_time(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts).ok().map(|dt| dt.to_utc())
}

/// Lowercase DNS-label form of a display name, at most `max` characters.
pub fn sanitize_name(name: &str, max: usize) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let mut out: String = out.trim_matches('-').chars().take(max).collect();
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push('x');
    }
    out
}
