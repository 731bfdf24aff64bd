//! Cucumber expressions: `I have {int} cucumber(s) in my belly/stomach`.
//!
//! * `{name}` is a parameter of a registered type
//! * `(text)` is optional text
//! * `a/b` are alternative words, bounded by whitespace
//! * `\` escapes any of `{}()/\` and whitespace

use std::sync::Arc;

use super::{Argument, ExpressionError, ParameterType, ParameterTypeRegistry, TreeRegexp};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    Whitespace(String),
    BeginOptional,
    EndOptional,
    BeginParameter,
    EndParameter,
    Alternation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Whitespace(String),
    Optional(Vec<Node>),
    Parameter(String),
    AlternativeSeparator,
    Alternation(Vec<Vec<Node>>),
}

#[derive(Debug, Clone)]
pub struct CucumberExpression {
    source: String,
    tree: TreeRegexp,
    parameter_types: Vec<Arc<ParameterType>>,
}

impl CucumberExpression {
    pub fn new(source: &str, registry: &ParameterTypeRegistry) -> Result<Self, ExpressionError> {
        let syntax = |message: &str| ExpressionError::Syntax {
            expression: source.to_string(),
            message: message.to_string(),
        };

        let tokens = tokenize(source).map_err(|m| syntax(m))?;
        let nodes = parse(&tokens).map_err(|m| syntax(m))?;
        let nodes = group_alternations(nodes).map_err(|m| syntax(m))?;

        let mut parameter_types = Vec::new();
        let mut pattern = String::from("^");
        for node in &nodes {
            pattern.push_str(&to_regex(node, source, registry, &mut parameter_types)?);
        }
        pattern.push('$');

        Ok(Self {
            source: source.to_string(),
            tree: TreeRegexp::new(&pattern)?,
            parameter_types,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The generated regex.
    pub fn regexp(&self) -> &str {
        self.tree.source()
    }

    pub fn parameter_types(&self) -> &[Arc<ParameterType>] {
        &self.parameter_types
    }

    pub fn match_text(&self, text: &str) -> Option<Vec<Argument>> {
        let root = self.tree.match_text(text)?;
        Some(Argument::build(root, &self.parameter_types))
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, &'static str> {
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut whitespace = String::new();
    let mut escaped = false;

    fn flush(text: &mut String, whitespace: &mut String, tokens: &mut Vec<Token>) {
        if !text.is_empty() {
            tokens.push(Token::Text(std::mem::take(text)));
        }
        if !whitespace.is_empty() {
            tokens.push(Token::Whitespace(std::mem::take(whitespace)));
        }
    }

    for c in source.chars() {
        if escaped {
            if !matches!(c, '{' | '}' | '(' | ')' | '\\' | '/') && !c.is_whitespace() {
                return Err(
                    "Only the characters '{', '}', '(', ')', '\\', '/' and whitespace can be escaped",
                );
            }
            if !whitespace.is_empty() {
                flush(&mut text, &mut whitespace, &mut tokens);
            }
            text.push(c);
            escaped = false;
            continue;
        }
        let structural = match c {
            '\\' => {
                escaped = true;
                continue;
            }
            '(' => Some(Token::BeginOptional),
            ')' => Some(Token::EndOptional),
            '{' => Some(Token::BeginParameter),
            '}' => Some(Token::EndParameter),
            '/' => Some(Token::Alternation),
            _ => None,
        };
        match structural {
            Some(token) => {
                flush(&mut text, &mut whitespace, &mut tokens);
                tokens.push(token);
            }
            None if c.is_whitespace() => {
                if !text.is_empty() {
                    flush(&mut text, &mut whitespace, &mut tokens);
                }
                whitespace.push(c);
            }
            None => {
                if !whitespace.is_empty() {
                    flush(&mut text, &mut whitespace, &mut tokens);
                }
                text.push(c);
            }
        }
    }
    if escaped {
        return Err("The end of line can not be escaped");
    }
    flush(&mut text, &mut whitespace, &mut tokens);
    Ok(tokens)
}

fn parse(tokens: &[Token]) -> Result<Vec<Node>, &'static str> {
    let mut nodes = Vec::new();
    let mut index = 0;
    while index < tokens.len() {
        match &tokens[index] {
            Token::BeginOptional => {
                let end = find_closing(tokens, index, &Token::EndOptional)
                    .ok_or("The '(' does not have a matching ')'")?;
                let mut inner = Vec::new();
                for token in &tokens[index + 1..end] {
                    match token {
                        Token::Text(text) | Token::Whitespace(text) => {
                            inner.push(Node::Text(text.clone()))
                        }
                        Token::BeginParameter | Token::EndParameter => {
                            return Err("An optional may not contain a parameter type")
                        }
                        Token::BeginOptional => {
                            return Err("An optional may not contain an other optional")
                        }
                        Token::Alternation => {
                            return Err("An alternation can not be used inside an optional")
                        }
                        Token::EndOptional => {}
                    }
                }
                if inner.is_empty() {
                    return Err("An optional must contain some text");
                }
                nodes.push(Node::Optional(inner));
                index = end + 1;
            }
            Token::BeginParameter => {
                let end = find_closing(tokens, index, &Token::EndParameter)
                    .ok_or("The '{' does not have a matching '}'")?;
                let mut name = String::new();
                for token in &tokens[index + 1..end] {
                    match token {
                        Token::Text(text) | Token::Whitespace(text) => name.push_str(text),
                        _ => {
                            return Err(
                                "Parameter names may not contain '{', '}', '(', ')', '\\' or '/'",
                            )
                        }
                    }
                }
                nodes.push(Node::Parameter(name));
                index = end + 1;
            }
            Token::Alternation => {
                nodes.push(Node::AlternativeSeparator);
                index += 1;
            }
            Token::EndOptional => {
                nodes.push(Node::Text(")".to_string()));
                index += 1;
            }
            Token::EndParameter => {
                nodes.push(Node::Text("}".to_string()));
                index += 1;
            }
            Token::Text(text) => {
                nodes.push(Node::Text(text.clone()));
                index += 1;
            }
            Token::Whitespace(text) => {
                nodes.push(Node::Whitespace(text.clone()));
                index += 1;
            }
        }
    }
    Ok(nodes)
}

fn find_closing(tokens: &[Token], open: usize, closing: &Token) -> Option<usize> {
    tokens[open + 1..]
        .iter()
        .position(|token| token == closing)
        .map(|offset| open + 1 + offset)
}

/// Turn whitespace-bounded runs containing `/` into alternations.
fn group_alternations(nodes: Vec<Node>) -> Result<Vec<Node>, &'static str> {
    if !nodes.contains(&Node::AlternativeSeparator) {
        return Ok(nodes);
    }

    let mut grouped = Vec::new();
    let mut run: Vec<Node> = Vec::new();

    fn close_run(run: &mut Vec<Node>, grouped: &mut Vec<Node>) -> Result<(), &'static str> {
        if !run.contains(&Node::AlternativeSeparator) {
            grouped.append(run);
            return Ok(());
        }
        let mut alternatives: Vec<Vec<Node>> = vec![Vec::new()];
        for node in run.drain(..) {
            match node {
                Node::AlternativeSeparator => alternatives.push(Vec::new()),
                other => {
                    if let Some(current) = alternatives.last_mut() {
                        current.push(other);
                    }
                }
            }
        }
        for alternative in &alternatives {
            if alternative.is_empty() {
                return Err("Alternative may not be empty");
            }
            if alternative.iter().any(|n| matches!(n, Node::Parameter(_))) {
                return Err("Parameter types cannot be alternative");
            }
            if alternative.iter().all(|n| matches!(n, Node::Optional(_))) {
                return Err("An alternative may not exclusively contain optionals");
            }
        }
        grouped.push(Node::Alternation(alternatives));
        Ok(())
    }

    for node in nodes {
        if matches!(node, Node::Whitespace(_)) {
            close_run(&mut run, &mut grouped)?;
            grouped.push(node);
        } else {
            run.push(node);
        }
    }
    close_run(&mut run, &mut grouped)?;
    Ok(grouped)
}

fn to_regex(
    node: &Node,
    expression: &str,
    registry: &ParameterTypeRegistry,
    parameter_types: &mut Vec<Arc<ParameterType>>,
) -> Result<String, ExpressionError> {
    Ok(match node {
        Node::Text(text) | Node::Whitespace(text) => regex::escape(text),
        Node::Optional(inner) => {
            let mut body = String::new();
            for node in inner {
                body.push_str(&to_regex(node, expression, registry, parameter_types)?);
            }
            format!("(?:{body})?")
        }
        Node::Parameter(name) => {
            let parameter_type = registry.lookup_by_name(name).ok_or_else(|| {
                ExpressionError::UndefinedParameterType {
                    name: name.clone(),
                    expression: expression.to_string(),
                }
            })?;
            let regex = match parameter_type.regexps() {
                [single] => format!("({single})"),
                many => format!(
                    "({})",
                    many.iter()
                        .map(|r| format!("(?:{r})"))
                        .collect::<Vec<_>>()
                        .join("|")
                ),
            };
            parameter_types.push(parameter_type);
            regex
        }
        Node::Alternation(alternatives) => {
            let mut parts = Vec::new();
            for alternative in alternatives {
                let mut part = String::new();
                for node in alternative {
                    part.push_str(&to_regex(node, expression, registry, parameter_types)?);
                }
                parts.push(part);
            }
            format!("(?:{})", parts.join("|"))
        }
        Node::AlternativeSeparator => regex::escape("/"),
    })
}
