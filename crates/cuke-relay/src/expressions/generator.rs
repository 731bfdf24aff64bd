//! Suggesting cucumber expressions for undefined step text.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use super::{ParameterType, ParameterTypeRegistry};

const MAX_EXPRESSIONS: usize = 256;

/// One suggested expression and the types of its parameters.
#[derive(Debug, Clone)]
pub struct GeneratedExpression {
    source: String,
    parameter_types: Vec<Arc<ParameterType>>,
}

impl GeneratedExpression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn parameter_types(&self) -> &[Arc<ParameterType>] {
        &self.parameter_types
    }

    /// Parameter names for a snippet: the type name, numbered on reuse
    /// (`int`, `int2`, ...).
    pub fn parameter_names(&self) -> Vec<String> {
        let mut usage: HashMap<&str, usize> = HashMap::new();
        self.parameter_types
            .iter()
            .map(|parameter_type| {
                let count = usage.entry(parameter_type.name()).or_insert(0);
                *count += 1;
                if *count == 1 {
                    parameter_type.name().to_string()
                } else {
                    format!("{}{}", parameter_type.name(), count)
                }
            })
            .collect()
    }
}

struct Matcher {
    parameter_type: Arc<ParameterType>,
    regex: Regex,
}

struct Found {
    parameter_type: Arc<ParameterType>,
    start: usize,
    end: usize,
}

impl Matcher {
    /// First whole-word match starting at or after byte offset `from`.
    fn find_from(&self, text: &str, from: usize) -> Option<Found> {
        let mut position = from;
        while position < text.len() {
            let found = self.regex.find_at(text, position)?;
            if !found.as_str().is_empty()
                && is_boundary_before(text, found.start())
                && is_boundary_after(text, found.end())
            {
                return Some(Found {
                    parameter_type: Arc::clone(&self.parameter_type),
                    start: found.start(),
                    end: found.end(),
                });
            }
            position = next_char_boundary(text, found.start());
        }
        None
    }
}

fn next_char_boundary(text: &str, position: usize) -> usize {
    text[position..]
        .chars()
        .next()
        .map_or(text.len(), |c| position + c.len_utf8())
}

fn is_word_separator(c: char) -> bool {
    !c.is_alphanumeric()
}

fn is_boundary_before(text: &str, start: usize) -> bool {
    text[..start].chars().next_back().map_or(true, is_word_separator)
}

fn is_boundary_after(text: &str, end: usize) -> bool {
    text[end..].chars().next().map_or(true, is_word_separator)
}

fn escape(text: &str) -> String {
    text.replace('(', "\\(")
        .replace('{', "\\{")
        .replace('/', "\\/")
}

pub struct CucumberExpressionGenerator<'a> {
    registry: &'a ParameterTypeRegistry,
}

impl<'a> CucumberExpressionGenerator<'a> {
    pub fn new(registry: &'a ParameterTypeRegistry) -> Self {
        Self { registry }
    }

    pub fn generate_expressions(&self, text: &str) -> Vec<GeneratedExpression> {
        let matchers = self.matchers();
        let mut template = String::new();
        let mut combinations: Vec<Vec<Arc<ParameterType>>> = Vec::new();
        let mut position = 0;

        loop {
            let mut found: Vec<Found> = matchers
                .iter()
                .filter_map(|matcher| matcher.find_from(text, position))
                .collect();
            if found.is_empty() {
                break;
            }
            found.sort_by(|a, b| {
                a.start
                    .cmp(&b.start)
                    .then_with(|| (b.end - b.start).cmp(&(a.end - a.start)))
            });
            let (best_start, best_end) = (found[0].start, found[0].end);

            let mut types: Vec<Arc<ParameterType>> = Vec::new();
            for candidate in found
                .iter()
                .filter(|f| f.start == best_start && f.end == best_end)
            {
                if !types.iter().any(|t| t.name() == candidate.parameter_type.name()) {
                    types.push(Arc::clone(&candidate.parameter_type));
                }
            }
            types.sort_by(|a, b| {
                b.prefer_for_regexp_match()
                    .cmp(&a.prefer_for_regexp_match())
                    .then_with(|| a.name().cmp(b.name()))
            });
            combinations.push(types);

            template.push_str(&escape(&text[position..best_start]));
            template.push_str("{}");
            position = best_end;
            if position >= text.len() {
                break;
            }
        }
        template.push_str(&escape(&text[position..]));

        let mut expressions = Vec::new();
        permute(&template, &combinations, &mut Vec::new(), &mut expressions);
        expressions
    }

    fn matchers(&self) -> Vec<Matcher> {
        let mut matchers = Vec::new();
        for parameter_type in self.registry.parameter_types() {
            if !parameter_type.use_for_snippets() {
                continue;
            }
            for regexp in parameter_type.regexps() {
                if let Ok(regex) = Regex::new(&format!("({regexp})")) {
                    matchers.push(Matcher {
                        parameter_type: Arc::clone(parameter_type),
                        regex,
                    });
                }
            }
        }
        matchers
    }
}

fn permute(
    template: &str,
    combinations: &[Vec<Arc<ParameterType>>],
    current: &mut Vec<Arc<ParameterType>>,
    output: &mut Vec<GeneratedExpression>,
) {
    if output.len() >= MAX_EXPRESSIONS {
        return;
    }
    if current.len() == combinations.len() {
        let mut source = String::with_capacity(template.len());
        let mut pieces = template.split("{}");
        if let Some(first) = pieces.next() {
            source.push_str(first);
        }
        for (piece, parameter_type) in pieces.zip(current.iter()) {
            source.push('{');
            source.push_str(parameter_type.name());
            source.push('}');
            source.push_str(piece);
        }
        output.push(GeneratedExpression {
            source,
            parameter_types: current.clone(),
        });
        return;
    }
    for parameter_type in &combinations[current.len()] {
        current.push(Arc::clone(parameter_type));
        permute(template, combinations, current, output);
        current.pop();
    }
}
