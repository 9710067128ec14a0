//! Query segment parsing for placeholder descriptors.
//!
//! Keys of the form `name[3]` build arrays and `a.b.c` keys build nested
//! objects; everything else is a flat string value.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;

static ARRAY_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+)\[(\d+)\]$").unwrap());
static DOT_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+\.\w+").unwrap());

/// Upper bound for `name[index]` keys so a hostile index cannot allocate unbounded arrays.
const MAX_ARRAY_INDEX: usize = 1024;

pub fn parse(input: &str) -> Map<String, Value> {
    let mut out = Map::new();
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix('?').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return out;
    }

    for pair in trimmed.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (raw_key, raw_value) = match pair.split_once('=') {
            Some((key, value)) => (key, Some(value)),
            None => (pair, None),
        };
        let key = decode(raw_key);
        let value = raw_value.map(decode).unwrap_or_default();

        if let Some(caps) = ARRAY_KEY_RE.captures(&key) {
            let Ok(index) = caps[2].parse::<usize>() else {
                continue;
            };
            if index > MAX_ARRAY_INDEX {
                continue;
            }
            insert_array(&mut out, &caps[1], index, value);
            continue;
        }

        if DOT_KEY_RE.is_match(&key) {
            insert_path(&mut out, &key, value);
            continue;
        }

        out.insert(key, Value::String(value));
    }

    out
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_string())
}

fn insert_array(out: &mut Map<String, Value>, name: &str, index: usize, value: String) {
    let entry = out
        .entry(name.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !entry.is_array() {
        *entry = Value::Array(Vec::new());
    }
    if let Value::Array(items) = entry {
        if items.len() <= index {
            items.resize(index + 1, Value::Null);
        }
        items[index] = Value::String(value);
    }
}

fn insert_path(out: &mut Map<String, Value>, key: &str, value: String) {
    let parts: Vec<&str> = key.split('.').filter(|part| !part.is_empty()).collect();
    let Some((last, parents)) = parts.split_last() else {
        return;
    };
    let mut ctx = out;
    for part in parents {
        let entry = ctx
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match entry {
            Value::Object(map) => ctx = map,
            // a scalar already sits at this path; leave it alone
            _ => return,
        }
    }
    ctx.insert(last.to_string(), Value::String(value));
}

/// Reads a flat string value, ignoring nested structures.
pub fn get_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}
