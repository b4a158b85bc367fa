//! Dot-path access into JSON documents: `answer`, `data.items[0].text`, `choices[0][1]`.
//!
//! Filters are comma separated lists of paths. Projecting a document through a filter yields an
//! object keyed by the path strings; paths that do not match are left out.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Returns `None` for syntactically invalid paths (unbalanced or non-numeric brackets).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let mut segments = Vec::new();
        for part in raw.split('.') {
            let (key, mut rest) = match part.find('[') {
                Some(i) => (&part[..i], &part[i..]),
                None => (part, ""),
            };
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_string()));
            } else if rest.is_empty() {
                return None;
            }
            while !rest.is_empty() {
                let close = rest.find(']')?;
                if !rest.starts_with('[') {
                    return None;
                }
                let idx: usize = rest[1..close].trim().parse().ok()?;
                segments.push(Segment::Index(idx));
                rest = &rest[close + 1..];
            }
        }
        Some(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn lookup<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut cur = value;
        for seg in &self.segments {
            cur = match seg {
                Segment::Key(k) => cur.as_object()?.get(k)?,
                Segment::Index(i) => cur.as_array()?.get(*i)?,
            };
        }
        Some(cur)
    }

    /// Lookup where the first segment names an entry of a value map.
    pub fn lookup_in<'a>(&self, values: &'a Map<String, Value>) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let Segment::Key(k) = first else {
            return None;
        };
        let mut cur = values.get(k)?;
        for seg in rest {
            cur = match seg {
                Segment::Key(k) => cur.as_object()?.get(k)?,
                Segment::Index(i) => cur.as_array()?.get(*i)?,
            };
        }
        Some(cur)
    }
}

fn split_filter(filter: &str) -> impl Iterator<Item = &str> {
    filter.split(',').map(str::trim).filter(|p| !p.is_empty())
}

/// Projects `value` through a comma separated path filter.
/// An absent or blank filter returns the document unchanged.
pub fn project(value: &Value, filter: Option<&str>) -> Value {
    let Some(filter) = filter.filter(|f| !f.trim().is_empty()) else {
        return value.clone();
    };
    let mut out = Map::new();
    for raw in split_filter(filter) {
        if let Some(found) = JsonPath::parse(raw).and_then(|p| p.lookup(value).cloned()) {
            out.insert(raw.to_string(), found);
        }
    }
    Value::Object(out)
}

/// Text selected by a filter. A single matching path yields that value's text; several are
/// joined line by line. Without a filter the whole document is rendered.
pub fn extract_text(value: &Value, filter: Option<&str>) -> Option<String> {
    let Some(filter) = filter.filter(|f| !f.trim().is_empty()) else {
        return Some(value_to_text(value));
    };
    let parts: Vec<String> = split_filter(filter)
        .filter_map(|raw| JsonPath::parse(raw).and_then(|p| p.lookup(value).map(value_to_text)))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// Strings render raw, everything else as compact JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
