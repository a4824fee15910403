//! Index naming
//!
//! Entity tables are templates such as `hero-{accountId}-{year}.{month}`.
//! Writes resolve the template into a concrete index name; reads search the
//! whole family through a wildcard pattern.

use crate::entity::FieldMapping;
use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use serde_json::{json, Value};

/// Resolve `{accountId}`, `{year}`, `{month}`, `{YYYY}` and `{MM}`. The
/// double-brace spellings (`{{accountId}}`) resolve to the same values.
pub fn index_name(table: &str, key: &str, now: DateTime<Utc>) -> String {
    let year = format!("{:04}", now.year());
    let month = format!("{:02}", now.month());
    let replacements = [
        ("accountId", key),
        ("year", year.as_str()),
        ("month", month.as_str()),
        ("YYYY", year.as_str()),
        ("MM", month.as_str()),
    ];

    let mut index = table.to_string();
    for (token, value) in replacements {
        index = index
            .replace(&format!("{{{{{}}}}}", token), value)
            .replace(&format!("{{{}}}", token), value);
    }
    index
}

/// Wildcard pattern covering every index of a table: `table-*` or
/// `table-shard-*`. The table is cut at its first `-{`.
pub fn index_pattern(table: &str, shard: &str) -> String {
    let base = match table.find("-{") {
        Some(idx) if idx > 0 => &table[..idx],
        _ => table,
    };
    if shard.is_empty() {
        format!("{}-*", base)
    } else {
        format!("{}-{}-*", base, shard)
    }
}

/// Index template name: the table up to its first `{`
pub fn template_name(table: &str) -> String {
    match table.find('{') {
        Some(idx) => table[..idx].to_string(),
        None => table.to_string(),
    }
}

/// Index template pattern: the table up to its first `-`, then `-*`
pub fn template_pattern(table: &str) -> String {
    match table.find('-') {
        Some(idx) => format!("{}-*", &table[..idx]),
        None => table.to_string(),
    }
}

/// Composable index template body for a table and its mappings
pub fn index_template(table: &str, fields: &[FieldMapping]) -> Value {
    json!({
        "index_patterns": [template_pattern(table)],
        "template": {
            "mappings": crate::entity::mapping_body(fields)
        }
    })
}

/// Match an index name against a `*` / `?` wildcard pattern
pub fn wildcard_match(name: &str, pattern: &str) -> bool {
    let mut expr = String::with_capacity(pattern.len() + 2);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map(|re| re.is_match(name)).unwrap_or(false)
}
