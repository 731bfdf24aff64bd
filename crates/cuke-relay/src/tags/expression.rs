//! Tag expressions: boolean formulas over tag names.
//!
//! Grammar: `and`, `or`, `not`, parentheses and tag literals. Operator
//! precedence is `not` > `and` > `or`. A backslash escapes `(`, `)`, `\` and
//! whitespace inside a literal. The empty expression matches everything.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Tag expression \"{expression}\" could not be parsed because of syntax error: {reason}")]
pub struct TagExpressionError {
    pub expression: String,
    pub reason: String,
}

/// Parsed tag expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagExpression {
    /// Matches any tag set
    True,

    /// Matches if the tag is present
    Tag(String),

    /// Negates the inner expression
    Not(Box<TagExpression>),

    /// Matches if ALL of the inner expressions match
    And(Vec<TagExpression>),

    /// Matches if ANY of the inner expressions match
    Or(Vec<TagExpression>),
}

impl Default for TagExpression {
    fn default() -> Self {
        TagExpression::True
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    And,
    Or,
    Not,
    Literal(String),
}

impl Token {
    fn precedence(&self) -> u8 {
        match self {
            Token::Or => 0,
            Token::And => 1,
            Token::Not => 2,
            _ => u8::MAX,
        }
    }

    fn is_operator(&self) -> bool {
        matches!(self, Token::And | Token::Or | Token::Not)
    }

    fn is_left_associative(&self) -> bool {
        matches!(self, Token::And | Token::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Operand,
    Operator,
}

impl TagExpression {
    /// Parse an infix tag expression.
    pub fn parse(infix: &str) -> Result<Self, TagExpressionError> {
        let syntax_error = |reason: &str| TagExpressionError {
            expression: infix.to_string(),
            reason: reason.to_string(),
        };

        let tokens = tokenize(infix).map_err(|reason| syntax_error(&reason))?;
        if tokens.is_empty() {
            return Ok(TagExpression::True);
        }

        let mut operators: Vec<Token> = Vec::new();
        let mut output: Vec<TagExpression> = Vec::new();
        let mut expected = Expect::Operand;

        let check = |expected: Expect, actual: Expect| {
            if expected == actual {
                Ok(())
            } else {
                Err(syntax_error(match expected {
                    Expect::Operand => "Expected operand.",
                    Expect::Operator => "Expected operator.",
                }))
            }
        };

        for token in tokens {
            match token {
                Token::Literal(name) => {
                    check(expected, Expect::Operand)?;
                    output.push(TagExpression::Tag(name));
                    expected = Expect::Operator;
                }
                Token::And | Token::Or => {
                    check(expected, Expect::Operator)?;
                    while let Some(top) = operators.last() {
                        let pops = top.is_operator()
                            && ((token.is_left_associative()
                                && token.precedence() <= top.precedence())
                                || token.precedence() < top.precedence());
                        if !pops {
                            break;
                        }
                        let top = operators
                            .pop()
                            .ok_or_else(|| syntax_error("Expected operator."))?;
                        apply(top, &mut output).map_err(|reason| syntax_error(reason))?;
                    }
                    operators.push(token);
                    expected = Expect::Operand;
                }
                Token::Not | Token::Open => {
                    check(expected, Expect::Operand)?;
                    operators.push(token);
                    expected = Expect::Operand;
                }
                Token::Close => {
                    check(expected, Expect::Operator)?;
                    loop {
                        match operators.pop() {
                            None => return Err(syntax_error("Unmatched ).")),
                            Some(Token::Open) => break,
                            Some(operator) => {
                                apply(operator, &mut output).map_err(|reason| syntax_error(reason))?
                            }
                        }
                    }
                    expected = Expect::Operator;
                }
            }
        }

        while let Some(operator) = operators.pop() {
            if operator == Token::Open {
                return Err(syntax_error("Unmatched (."));
            }
            apply(operator, &mut output).map_err(|reason| syntax_error(reason))?;
        }

        match (output.pop(), output.is_empty()) {
            (Some(expression), true) => Ok(expression),
            _ => Err(syntax_error("Expected operator.")),
        }
    }

    /// Evaluate against a set of tag names (including the leading `@`).
    pub fn evaluate<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        match self {
            TagExpression::True => true,
            TagExpression::Tag(name) => tags.iter().any(|tag| tag.as_ref() == name),
            TagExpression::Not(inner) => !inner.evaluate(tags),
            TagExpression::And(inner) => inner.iter().all(|e| e.evaluate(tags)),
            TagExpression::Or(inner) => inner.iter().any(|e| e.evaluate(tags)),
        }
    }
}

fn apply(operator: Token, output: &mut Vec<TagExpression>) -> Result<(), &'static str> {
    match operator {
        Token::Not => {
            let inner = output.pop().ok_or("Expected operand.")?;
            output.push(TagExpression::Not(Box::new(inner)));
        }
        Token::And | Token::Or => {
            let right = output.pop().ok_or("Expected operand.")?;
            let left = output.pop().ok_or("Expected operand.")?;
            output.push(combine(operator == Token::And, left, right));
        }
        _ => return Err("Expected operator."),
    }
    Ok(())
}

/// Build `left op right`, flattening chains of the same operator.
fn combine(and: bool, left: TagExpression, right: TagExpression) -> TagExpression {
    let mut items = match (and, left) {
        (true, TagExpression::And(items)) | (false, TagExpression::Or(items)) => items,
        (_, other) => vec![other],
    };
    items.push(right);
    if and {
        TagExpression::And(items)
    } else {
        TagExpression::Or(items)
    }
}

fn tokenize(infix: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut escaped = false;

    let flush = |literal: &mut String, tokens: &mut Vec<Token>| {
        if literal.is_empty() {
            return;
        }
        let word = std::mem::take(literal);
        tokens.push(match word.as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            _ => Token::Literal(word),
        });
    };

    for c in infix.chars() {
        if escaped {
            if c == '(' || c == ')' || c == '\\' || c.is_whitespace() {
                literal.push(c);
                escaped = false;
                continue;
            }
            return Err(format!("Illegal escape before \"{c}\"."));
        }
        match c {
            '\\' => escaped = true,
            '(' | ')' => {
                flush(&mut literal, &mut tokens);
                tokens.push(if c == '(' { Token::Open } else { Token::Close });
            }
            c if c.is_whitespace() => flush(&mut literal, &mut tokens),
            c => literal.push(c),
        }
    }
    if escaped {
        return Err("Expression ends with an escape character.".to_string());
    }
    flush(&mut literal, &mut tokens);
    Ok(tokens)
}

fn escape_literal(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if c == '(' || c == ')' || c == '\\' || c.is_whitespace() {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl fmt::Display for TagExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagExpression::True => Ok(()),
            TagExpression::Tag(name) => f.write_str(&escape_literal(name)),
            TagExpression::Not(inner) => match inner.as_ref() {
                TagExpression::And(_) | TagExpression::Or(_) => write!(f, "not {inner}"),
                _ => write!(f, "not ( {inner} )"),
            },
            TagExpression::And(items) | TagExpression::Or(items) => {
                let joiner = if matches!(self, TagExpression::And(_)) {
                    " and "
                } else {
                    " or "
                };
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "( {} )", parts.join(joiner))
            }
        }
    }
}
