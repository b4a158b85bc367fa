//! Placeholder substitution for requests, golden answers and judge prompts.
//!
//! Two token forms are recognised: `{{field.path}}`, looked up in the value maps in priority
//! order, and `[FILE: name]`, expanded from a [`FileStore`]. Substitution is a single pass over the
//! input; text produced by a substitution is never scanned again.

mod files;

pub use files::{DirFileStore, FileStore};

use crate::errors::{EngineError, Result};
use crate::json_path::{value_to_text, JsonPath};
use crate::model::{RequestSpec, Values};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::Value;

lazy_static! {
    static ref TOKEN: Regex =
        Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}|\[FILE:\s*([^\]]+?)\s*\]").expect("token regex");
}

/// A resolved value plus the placeholders that could not be filled.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

impl<T> Resolved<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        Resolved {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}

enum Token<'t> {
    Placeholder(&'t str),
    File(&'t str),
}

fn token<'t>(caps: &Captures<'t>) -> Option<Token<'t>> {
    if let Some(m) = caps.get(1) {
        return Some(Token::Placeholder(m.as_str()));
    }
    caps.get(2).map(|m| Token::File(m.as_str()))
}

#[derive(Default)]
pub struct Resolver<'a> {
    sources: Vec<&'a Values>,
    files: Option<&'a dyn FileStore>,
}

impl<'a> Resolver<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value map. Earlier maps take precedence over later ones.
    pub fn with_values(mut self, values: &'a Values) -> Self {
        self.sources.push(values);
        self
    }

    pub fn with_files(mut self, files: Option<&'a dyn FileStore>) -> Self {
        self.files = files;
        self
    }

    fn lookup(&self, name: &str) -> Option<&'a Value> {
        let path = JsonPath::parse(name)?;
        self.sources.iter().find_map(|src| path.lookup_in(*src))
    }

    fn read_file(&self, name: &str) -> Result<String> {
        let store = self.files.ok_or_else(|| {
            EngineError::TemplateResolution(format!("file '{name}' referenced but no file store is configured"))
        })?;
        match store.get(name)? {
            Some(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            None => Err(EngineError::TemplateResolution(format!(
                "referenced file not found: {name}"
            ))),
        }
    }

    fn resolve_string(&self, s: &str, warnings: &mut Vec<String>) -> Result<Value> {
        // A string that is exactly one token keeps the value's JSON type.
        if let Some(caps) = TOKEN.captures(s) {
            let whole = caps.get(0).map(|m| m.start() == 0 && m.end() == s.len());
            if whole == Some(true) {
                match token(&caps) {
                    Some(Token::Placeholder(name)) => {
                        if let Some(v) = self.lookup(name) {
                            return Ok(v.clone());
                        }
                        warnings.push(format!("unresolved placeholder {s}"));
                        return Ok(Value::String(s.to_string()));
                    }
                    Some(Token::File(name)) => return Ok(Value::String(self.read_file(name)?)),
                    None => {}
                }
            }
        }

        let mut out = String::with_capacity(s.len());
        let mut last = 0;
        for caps in TOKEN.captures_iter(s) {
            let Some(m) = caps.get(0) else { continue };
            out.push_str(&s[last..m.start()]);
            match token(&caps) {
                Some(Token::Placeholder(name)) => match self.lookup(name) {
                    Some(v) => out.push_str(&value_to_text(v)),
                    None => {
                        warnings.push(format!("unresolved placeholder {}", m.as_str()));
                        out.push_str(m.as_str());
                    }
                },
                Some(Token::File(name)) => out.push_str(&self.read_file(name)?),
                None => out.push_str(m.as_str()),
            }
            last = m.end();
        }
        out.push_str(&s[last..]);
        Ok(Value::String(out))
    }

    fn walk(&self, value: &Value, warnings: &mut Vec<String>) -> Result<Value> {
        Ok(match value {
            Value::String(s) => self.resolve_string(s, warnings)?,
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.walk(v, warnings))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.walk(v, warnings)?);
                }
                Value::Object(out)
            }
            other => other.clone(),
        })
    }

    pub fn resolve_value(&self, value: &Value) -> Result<Resolved<Value>> {
        let mut warnings = Vec::new();
        let value = self.walk(value, &mut warnings)?;
        Ok(Resolved { value, warnings })
    }

    /// Resolves a string, always producing text (used for judge prompts).
    pub fn resolve_text(&self, text: &str) -> Result<Resolved<String>> {
        let resolved = self.resolve_value(&Value::String(text.to_string()))?;
        Ok(resolved.map(|v| value_to_text(&v)))
    }

    pub fn resolve_request(&self, spec: &RequestSpec) -> Result<Resolved<RequestSpec>> {
        let mut warnings = Vec::new();
        let url = self.resolve_text_into(&spec.url, &mut warnings)?;
        let mut headers = spec.headers.clone();
        for value in headers.values_mut() {
            *value = self.resolve_text_into(value, &mut warnings)?;
        }
        let body = match &spec.body {
            Some(b) => Some(self.walk(b, &mut warnings)?),
            None => None,
        };
        Ok(Resolved {
            value: RequestSpec {
                url,
                method: spec.method,
                headers,
                body,
            },
            warnings,
        })
    }

    fn resolve_text_into(&self, s: &str, warnings: &mut Vec<String>) -> Result<String> {
        Ok(value_to_text(&self.resolve_string(s, warnings)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HttpMethod;
    use serde_json::json;
    use std::collections::HashMap;

    fn values(v: Value) -> Values {
        v.as_object().cloned().unwrap()
    }

    struct MapFiles(HashMap<String, Vec<u8>>);

    impl FileStore for MapFiles {
        fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.0.get(name).cloned())
        }
    }

    #[test]
    fn substitutes_known_and_keeps_unknown_with_warning() {
        let data = values(json!({"x": "v"}));
        let r = Resolver::new().with_values(&data);
        let out = r.resolve_value(&json!({"a": "{{x}}", "b": "pre {{ y }} post"})).unwrap();
        assert_eq!(out.value, json!({"a": "v", "b": "pre {{ y }} post"}));
        assert_eq!(out.warnings, vec!["unresolved placeholder {{ y }}".to_string()]);
    }

    #[test]
    fn single_token_keeps_json_type() {
        let data = values(json!({"n": 3, "obj": {"k": [1, 2]}}));
        let r = Resolver::new().with_values(&data);
        let out = r
            .resolve_value(&json!({"count": "{{n}}", "o": "{{obj}}", "s": "n={{n}}", "k": "{{obj.k[1]}}"}))
            .unwrap();
        assert_eq!(out.value, json!({"count": 3, "o": {"k": [1, 2]}, "s": "n=3", "k": 2}));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn case_values_win_over_run_data() {
        let case = values(json!({"query": "from case"}));
        let run = values(json!({"query": "from run", "auth_token": "t0k"}));
        let r = Resolver::new().with_values(&case).with_values(&run);
        let spec = RequestSpec {
            url: "http://svc/ask".into(),
            method: HttpMethod::Post,
            headers: [("Authorization".to_string(), "Bearer {{auth_token}}".to_string())].into(),
            body: Some(json!({"q": "{{query}}"})),
        };
        let out = r.resolve_request(&spec).unwrap();
        assert_eq!(out.value.body, Some(json!({"q": "from case"})));
        assert_eq!(out.value.headers["Authorization"], "Bearer t0k");
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        let data = values(json!({"a": "{{b}}", "b": "boom"}));
        let r = Resolver::new().with_values(&data);
        let out = r.resolve_value(&json!("x {{a}}")).unwrap();
        assert_eq!(out.value, json!("x {{b}}"));
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn file_reference_expands_or_fails() {
        let files = MapFiles([("doc.txt".to_string(), b"hello file".to_vec())].into());
        let r = Resolver::new().with_files(Some(&files));
        let out = r.resolve_value(&json!({"doc": "[FILE: doc.txt]", "s": "see [FILE:doc.txt]!"})).unwrap();
        assert_eq!(out.value, json!({"doc": "hello file", "s": "see hello file!"}));

        let err = r.resolve_value(&json!("[FILE: missing.pdf]")).unwrap_err();
        assert!(matches!(err, EngineError::TemplateResolution(_)));
    }

    #[test]
    fn object_keys_and_non_strings_pass_through() {
        let data = values(json!({"k": "v"}));
        let r = Resolver::new().with_values(&data);
        let out = r.resolve_value(&json!({"{{k}}": [true, 1.5, null]})).unwrap();
        assert_eq!(out.value, json!({"{{k}}": [true, 1.5, null]}));
    }
}
