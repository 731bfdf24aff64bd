//! A regex paired with the nesting structure of its capture groups.
//!
//! `regex` reports captures as a flat list; step arguments need them as a
//! tree (a parameter's own inner groups become its children). The tree is
//! derived from the pattern source, so groups that did not participate in
//! a match still occupy their slot.

use regex::{Captures, Regex};

use crate::messages::Group;

use super::ExpressionError;

/// Shape of one capturing group.
#[derive(Debug, Clone, Default)]
pub struct GroupBuilder {
    pub source: String,
    pub children: Vec<GroupBuilder>,
}

impl GroupBuilder {
    fn build(&self, text: &str, captures: &Captures<'_>, index: &mut usize) -> Group {
        let own = captures.get(*index);
        *index += 1;
        let children = self
            .children
            .iter()
            .map(|child| child.build(text, captures, index))
            .collect();
        Group {
            children,
            start: own.map(|m| text[..m.start()].chars().count()),
            value: own.map(|m| m.as_str().to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TreeRegexp {
    regex: Regex,
    root: GroupBuilder,
}

impl TreeRegexp {
    pub fn new(source: &str) -> Result<Self, ExpressionError> {
        let regex = Regex::new(source).map_err(|err| ExpressionError::InvalidRegex {
            pattern: source.to_string(),
            message: err.to_string(),
        })?;
        Ok(Self {
            regex,
            root: group_tree(source),
        })
    }

    pub fn source(&self) -> &str {
        self.regex.as_str()
    }

    pub fn root(&self) -> &GroupBuilder {
        &self.root
    }

    /// Match `text`, returning the group tree rooted at the whole match.
    pub fn match_text(&self, text: &str) -> Option<Group> {
        let captures = self.regex.captures(text)?;
        let mut index = 0;
        Some(self.root.build(text, &captures, &mut index))
    }
}

struct OpenGroup {
    builder: GroupBuilder,
    capturing: bool,
    start: usize,
}

/// Recover the capture-group tree from a pattern.
fn group_tree(source: &str) -> GroupBuilder {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut stack = vec![OpenGroup {
        builder: GroupBuilder {
            source: source.to_string(),
            children: Vec::new(),
        },
        capturing: true,
        start: 0,
    }];
    let mut escaping = false;
    let mut in_class = false;

    for (position, &(offset, c)) in chars.iter().enumerate() {
        if escaping {
            escaping = false;
            continue;
        }
        match c {
            '\\' => escaping = true,
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => {
                let capturing = is_capturing(&chars[position + 1..]);
                stack.push(OpenGroup {
                    builder: GroupBuilder::default(),
                    capturing,
                    start: offset + 1,
                });
            }
            ')' if !in_class && stack.len() > 1 => {
                if let Some(mut closed) = stack.pop() {
                    let parent = stack.last_mut().map(|open| &mut open.builder);
                    if let Some(parent) = parent {
                        if closed.capturing {
                            closed.builder.source = source[closed.start..offset].to_string();
                            parent.children.push(closed.builder);
                        } else {
                            parent.children.append(&mut closed.builder.children);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    stack.truncate(1);
    stack.pop().map(|open| open.builder).unwrap_or_default()
}

/// `(` opens a capturing group unless followed by `?`, except for named
/// groups (`(?<name>` / `(?P<name>`).
fn is_capturing(rest: &[(usize, char)]) -> bool {
    let next: Vec<char> = rest.iter().take(3).map(|&(_, c)| c).collect();
    match next.as_slice() {
        ['?', 'P', '<', ..] => true,
        ['?', '<', c, ..] => *c != '=' && *c != '!',
        ['?', ..] => false,
        _ => true,
    }
}
