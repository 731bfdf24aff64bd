//! Configuration overrides carried by tags, e.g. `@retries(2)` or
//! `@browser=firefox`.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static OPTION_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@([a-zA-Z][\w-]*)(?:\((.*)\)|=(.+))$").expect("option tag regex is valid")
});

/// Options that only make sense on a suite (feature or rule).
const SUITE_ONLY_OPTIONS: &[&str] = &["testIsolation"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagOptionError {
    #[error("Tag {0} is not a configuration tag")]
    NotAnOption(String),

    #[error(
        "Tag {tag} configures {option}, which can only be set on a feature or rule, not on a scenario"
    )]
    SuiteOnly { tag: String, option: String },
}

/// Options collected from a node's tags, later tags overriding earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestOptions(BTreeMap<String, Value>);

impl TestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect options from every configuration-shaped tag in `tags`.
    pub fn from_tags<S: AsRef<str>>(tags: &[S]) -> Result<Self, TagOptionError> {
        let mut options = Self::new();
        for tag in tags {
            let tag = tag.as_ref();
            if looks_like_option(tag) {
                let (key, value) = tag_to_option(tag)?;
                options.0.insert(key, value);
            }
        }
        Ok(options)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Retry count: a number, or `{"runMode": n}`.
    pub fn retries(&self) -> Option<u32> {
        match self.0.get("retries")? {
            Value::Number(n) => n.as_u64().map(|n| n as u32),
            Value::Object(modes) => modes
                .get("runMode")
                .and_then(Value::as_u64)
                .map(|n| n as u32),
            _ => None,
        }
    }

    /// Only the options a suite may set.
    pub fn suite_level(&self) -> Self {
        self.partition(true)
    }

    /// Everything except suite-only options.
    pub fn test_level(&self) -> Self {
        self.partition(false)
    }

    fn partition(&self, suite_only: bool) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(key, _)| is_suite_only(key) == suite_only)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    /// Fail if any option here may only be set on a suite.
    pub fn ensure_test_level(&self) -> Result<(), TagOptionError> {
        match self.0.keys().find(|key| is_suite_only(key)) {
            Some(option) => Err(TagOptionError::SuiteOnly {
                tag: format!("@{option}"),
                option: option.clone(),
            }),
            None => Ok(()),
        }
    }
}

pub fn looks_like_option(tag: &str) -> bool {
    OPTION_TAG.is_match(tag)
}

pub fn is_suite_only(option: &str) -> bool {
    SUITE_ONLY_OPTIONS.contains(&option)
}

/// Split a configuration tag into key and value.
pub fn tag_to_option(tag: &str) -> Result<(String, Value), TagOptionError> {
    let captures = OPTION_TAG
        .captures(tag)
        .ok_or_else(|| TagOptionError::NotAnOption(tag.to_string()))?;

    let key = match &captures[1] {
        "retry" => "retries".to_string(),
        other => other.to_string(),
    };
    let raw = captures
        .get(2)
        .or_else(|| captures.get(3))
        .map_or("", |m| m.as_str());

    Ok((key, parse_value(raw)))
}

fn parse_value(raw: &str) -> Value {
    let raw = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return value;
    }
    let unquoted = raw
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .unwrap_or(raw);
    Value::String(unquoted.to_string())
}
