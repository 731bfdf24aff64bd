//! Parameter types and their registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::ExpressionError;

/// Converts the captured group values of one argument into a value.
pub type Transformer = Arc<dyn Fn(&[Option<&str>]) -> anyhow::Result<Value> + Send + Sync>;

pub const INTEGER_REGEXPS: &[&str] = &[r"-?\d+", r"\d+"];
pub const FLOAT_REGEXP: &str = r"[-+]?(?:\d+(?:\.\d+)?|\.\d+)(?:[eE][-+]?\d+)?";
pub const WORD_REGEXP: &str = r"[^\s]+";
pub const STRING_REGEXPS: &[&str] = &[
    r#""([^"\\]*(\\.[^"\\]*)*)""#,
    r"'([^'\\]*(\\.[^'\\]*)*)'",
];
pub const ANONYMOUS_REGEXP: &str = ".*";

const ILLEGAL_NAME_CHARS: &[char] = &['(', ')', '{', '}', '\\', '/'];

#[derive(Clone)]
pub struct ParameterType {
    name: String,
    regexps: Vec<String>,
    transformer: Transformer,
    use_for_snippets: bool,
    prefer_for_regexp_match: bool,
    builtin: bool,
}

impl fmt::Debug for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterType")
            .field("name", &self.name)
            .field("regexps", &self.regexps)
            .field("use_for_snippets", &self.use_for_snippets)
            .field("prefer_for_regexp_match", &self.prefer_for_regexp_match)
            .field("builtin", &self.builtin)
            .finish()
    }
}

impl ParameterType {
    pub fn new<F>(name: &str, regexps: &[&str], transformer: F) -> Result<Self, ExpressionError>
    where
        F: Fn(&[Option<&str>]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        if name.contains(ILLEGAL_NAME_CHARS) {
            return Err(ExpressionError::IllegalParameterName(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            regexps: regexps.iter().map(|r| r.to_string()).collect(),
            transformer: Arc::new(transformer),
            use_for_snippets: true,
            prefer_for_regexp_match: false,
            builtin: false,
        })
    }

    pub fn with_use_for_snippets(mut self, use_for_snippets: bool) -> Self {
        self.use_for_snippets = use_for_snippets;
        self
    }

    pub fn with_prefer_for_regexp_match(mut self, prefer: bool) -> Self {
        self.prefer_for_regexp_match = prefer;
        self
    }

    fn builtin(mut self) -> Self {
        self.builtin = true;
        self
    }

    /// Type for a regex capture group no registered type claims.
    pub fn anonymous(regexp: &str) -> Self {
        Self {
            name: String::new(),
            regexps: vec![regexp.to_string()],
            transformer: Arc::new(first_string),
            use_for_snippets: false,
            prefer_for_regexp_match: true,
            builtin: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn regexps(&self) -> &[String] {
        &self.regexps
    }

    pub fn use_for_snippets(&self) -> bool {
        self.use_for_snippets
    }

    pub fn prefer_for_regexp_match(&self) -> bool {
        self.prefer_for_regexp_match
    }

    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    pub fn transform(&self, values: &[Option<&str>]) -> anyhow::Result<Value> {
        (self.transformer)(values)
    }

    /// Preferential types first, then by name.
    fn compare(a: &ParameterType, b: &ParameterType) -> std::cmp::Ordering {
        b.prefer_for_regexp_match
            .cmp(&a.prefer_for_regexp_match)
            .then_with(|| a.name.cmp(&b.name))
    }
}

fn first_string(values: &[Option<&str>]) -> anyhow::Result<Value> {
    Ok(values
        .iter()
        .flatten()
        .next()
        .map_or(Value::Null, |s| Value::String(s.to_string())))
}

fn parse_integer(values: &[Option<&str>]) -> anyhow::Result<Value> {
    match values.first().copied().flatten() {
        Some(raw) => Ok(Value::from(raw.parse::<i64>()?)),
        None => Ok(Value::Null),
    }
}

fn parse_float(values: &[Option<&str>]) -> anyhow::Result<Value> {
    match values.first().copied().flatten() {
        Some(raw) => {
            let parsed = raw.parse::<f64>()?;
            Ok(serde_json::Number::from_f64(parsed).map_or(Value::Null, Value::Number))
        }
        None => Ok(Value::Null),
    }
}

fn unescape_string(values: &[Option<&str>]) -> anyhow::Result<Value> {
    let raw = values.iter().flatten().next().copied().unwrap_or("");
    Ok(Value::String(raw.replace("\\\"", "\"").replace("\\'", "'")))
}

/// Registry of parameter types by name and by regexp.
#[derive(Debug, Clone)]
pub struct ParameterTypeRegistry {
    ordered: Vec<Arc<ParameterType>>,
    by_name: HashMap<String, Arc<ParameterType>>,
    by_regexp: HashMap<String, Vec<Arc<ParameterType>>>,
}

impl Default for ParameterTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterTypeRegistry {
    /// A registry holding the built-in types.
    pub fn new() -> Self {
        let mut registry = Self {
            ordered: Vec::new(),
            by_name: HashMap::new(),
            by_regexp: HashMap::new(),
        };
        for parameter_type in builtin_types() {
            // Built-ins never collide with each other.
            let _ = registry.define(parameter_type.builtin());
        }
        registry
    }

    pub fn define(&mut self, parameter_type: ParameterType) -> Result<(), ExpressionError> {
        if self.by_name.contains_key(parameter_type.name()) {
            return Err(ExpressionError::DuplicateParameterType(
                parameter_type.name().to_string(),
            ));
        }

        for regexp in parameter_type.regexps() {
            if let Some(existing) = self.by_regexp.get(regexp) {
                if let Some(first) = existing.first() {
                    if first.prefer_for_regexp_match() && parameter_type.prefer_for_regexp_match() {
                        return Err(ExpressionError::DuplicatePreferential {
                            regexp: regexp.clone(),
                            first: first.name().to_string(),
                            second: parameter_type.name().to_string(),
                        });
                    }
                }
            }
        }

        let parameter_type = Arc::new(parameter_type);
        for regexp in parameter_type.regexps() {
            let list = self.by_regexp.entry(regexp.clone()).or_default();
            list.push(Arc::clone(&parameter_type));
            list.sort_by(|a, b| ParameterType::compare(a, b));
        }
        self.by_name
            .insert(parameter_type.name().to_string(), Arc::clone(&parameter_type));
        self.ordered.push(parameter_type);
        Ok(())
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<ParameterType>> {
        self.by_name.get(name).cloned()
    }

    /// The type owning `regexp`, failing when several non-preferential types
    /// share it.
    pub fn lookup_by_regexp(
        &self,
        regexp: &str,
        expression: &str,
    ) -> Result<Option<Arc<ParameterType>>, ExpressionError> {
        let Some(candidates) = self.by_regexp.get(regexp) else {
            return Ok(None);
        };
        match candidates.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(Arc::clone(only))),
            [first, ..] if first.prefer_for_regexp_match() => Ok(Some(Arc::clone(first))),
            many => Err(ExpressionError::AmbiguousParameterType {
                expression: expression.to_string(),
                regexp: regexp.to_string(),
                candidates: many
                    .iter()
                    .map(|t| format!("{{{}}}", t.name()))
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    pub fn parameter_types(&self) -> impl Iterator<Item = &Arc<ParameterType>> {
        self.ordered.iter()
    }
}

fn builtin_types() -> Vec<ParameterType> {
    let types: Vec<Result<ParameterType, ExpressionError>> = vec![
        ParameterType::new("int", INTEGER_REGEXPS, parse_integer)
            .map(|t| t.with_prefer_for_regexp_match(true)),
        ParameterType::new("float", &[FLOAT_REGEXP], parse_float),
        ParameterType::new("word", &[WORD_REGEXP], first_string)
            .map(|t| t.with_use_for_snippets(false)),
        ParameterType::new("string", STRING_REGEXPS, unescape_string),
        ParameterType::new("", &[ANONYMOUS_REGEXP], first_string).map(|t| {
            t.with_use_for_snippets(false)
                .with_prefer_for_regexp_match(true)
        }),
        ParameterType::new("bigdecimal", &[FLOAT_REGEXP], parse_float)
            .map(|t| t.with_use_for_snippets(false)),
        ParameterType::new("double", &[FLOAT_REGEXP], parse_float)
            .map(|t| t.with_use_for_snippets(false)),
        ParameterType::new("biginteger", INTEGER_REGEXPS, parse_integer)
            .map(|t| t.with_use_for_snippets(false)),
        ParameterType::new("byte", INTEGER_REGEXPS, parse_integer)
            .map(|t| t.with_use_for_snippets(false)),
        ParameterType::new("short", INTEGER_REGEXPS, parse_integer)
            .map(|t| t.with_use_for_snippets(false)),
        ParameterType::new("long", INTEGER_REGEXPS, parse_integer)
            .map(|t| t.with_use_for_snippets(false)),
    ];
    types.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtins_are_registered() {
        let registry = ParameterTypeRegistry::new();
        for name in ["int", "float", "word", "string", "", "long", "double"] {
            let found = registry.lookup_by_name(name).unwrap();
            assert!(found.is_builtin(), "{name} should be builtin");
        }
    }

    #[test]
    fn test_builtin_transforms() {
        let registry = ParameterTypeRegistry::new();
        let int = registry.lookup_by_name("int").unwrap();
        assert_eq!(int.transform(&[Some("-12")]).unwrap(), json!(-12));
        let float = registry.lookup_by_name("float").unwrap();
        assert_eq!(float.transform(&[Some("1.5")]).unwrap(), json!(1.5));
        let string = registry.lookup_by_name("string").unwrap();
        assert_eq!(
            string.transform(&[None, Some(r"it\'s")]).unwrap(),
            json!("it's")
        );
    }

    #[test]
    fn test_int_transform_reports_bad_input() {
        let registry = ParameterTypeRegistry::new();
        let int = registry.lookup_by_name("int").unwrap();
        assert!(int.transform(&[Some("abc")]).is_err());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = ParameterTypeRegistry::new();
        let duplicate = ParameterType::new("int", &["x"], first_string).unwrap();
        assert!(matches!(
            registry.define(duplicate),
            Err(ExpressionError::DuplicateParameterType(_))
        ));
    }

    #[test]
    fn test_illegal_name_rejected() {
        assert!(matches!(
            ParameterType::new("a{b", &["x"], first_string),
            Err(ExpressionError::IllegalParameterName(_))
        ));
    }

    #[test]
    fn test_lookup_by_regexp_prefers_preferential() {
        let registry = ParameterTypeRegistry::new();
        let found = registry.lookup_by_regexp(r"\d+", r"(\d+)").unwrap().unwrap();
        assert_eq!(found.name(), "int");
    }

    #[test]
    fn test_lookup_by_regexp_ambiguous() {
        let registry = ParameterTypeRegistry::new();
        assert!(matches!(
            registry.lookup_by_regexp(FLOAT_REGEXP, "x"),
            Err(ExpressionError::AmbiguousParameterType { .. })
        ));
    }

    #[test]
    fn test_two_preferential_types_for_one_regexp() {
        let mut registry = ParameterTypeRegistry::new();
        let color = ParameterType::new("color", &["red|blue"], first_string)
            .unwrap()
            .with_prefer_for_regexp_match(true);
        let shade = ParameterType::new("shade", &["red|blue"], first_string)
            .unwrap()
            .with_prefer_for_regexp_match(true);
        registry.define(color).unwrap();
        assert!(matches!(
            registry.define(shade),
            Err(ExpressionError::DuplicatePreferential { .. })
        ));
    }
}
