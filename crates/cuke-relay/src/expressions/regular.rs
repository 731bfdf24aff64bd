use std::sync::Arc;

use super::{Argument, ExpressionError, ParameterType, ParameterTypeRegistry, TreeRegexp};

/// A step pattern given as a regular expression. Each top-level capture
/// group is typed by the parameter type registered for its exact regexp, or
/// by an anonymous string type.
#[derive(Debug, Clone)]
pub struct RegularExpression {
    tree: TreeRegexp,
    parameter_types: Vec<Arc<ParameterType>>,
}

impl RegularExpression {
    pub fn new(source: &str, registry: &ParameterTypeRegistry) -> Result<Self, ExpressionError> {
        let tree = TreeRegexp::new(source)?;
        let mut parameter_types = Vec::new();
        for group in &tree.root().children {
            let parameter_type = match registry.lookup_by_regexp(&group.source, source)? {
                Some(parameter_type) => parameter_type,
                None => Arc::new(ParameterType::anonymous(&group.source)),
            };
            parameter_types.push(parameter_type);
        }
        Ok(Self {
            tree,
            parameter_types,
        })
    }

    pub fn source(&self) -> &str {
        self.tree.source()
    }

    pub fn match_text(&self, text: &str) -> Option<Vec<Argument>> {
        let root = self.tree.match_text(text)?;
        Some(Argument::build(root, &self.parameter_types))
    }
}
