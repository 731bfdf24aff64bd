use std::sync::Arc;

use serde_json::Value;

use crate::messages::{Group, StepMatchArgument};

use super::ParameterType;

/// One matched step argument.
#[derive(Debug, Clone)]
pub struct Argument {
    pub group: Group,
    pub parameter_type: Arc<ParameterType>,
}

impl Argument {
    /// Pair the root group's children with the expression's parameter types.
    pub(crate) fn build(root: Group, parameter_types: &[Arc<ParameterType>]) -> Vec<Argument> {
        root.children
            .into_iter()
            .zip(parameter_types)
            .map(|(group, parameter_type)| Argument {
                group,
                parameter_type: Arc::clone(parameter_type),
            })
            .collect()
    }

    pub fn value(&self) -> anyhow::Result<Value> {
        self.parameter_type.transform(&self.group.values())
    }

    pub fn to_message(&self) -> StepMatchArgument {
        StepMatchArgument {
            group: self.group.clone(),
            parameter_type_name: Some(self.parameter_type.name().to_string()),
        }
    }
}
