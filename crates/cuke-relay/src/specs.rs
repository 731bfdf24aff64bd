//! Dropping specs that have nothing to run under the configured tags.

use tracing::debug;

use crate::config::{Configuration, FilterSpecsMixedMode};
use crate::messages::Pickle;
use crate::reconciler::Spec;
use crate::tags::{TagExpression, TagExpressionError};

/// A spec together with its pickles. Non-feature specs have none.
#[derive(Debug, Clone, Copy)]
pub struct SpecCandidate<'a> {
    pub spec: &'a Spec,
    pub pickles: &'a [Pickle],
}

/// Keep the specs worth running.
///
/// Without `filterSpecs` or a tag expression, everything is kept. Feature
/// specs are kept when at least one pickle matches. Non-feature specs follow
/// the mixed mode: `hide` drops them, `show` keeps them and `empty-set`
/// matches the expression against no tags at all.
pub fn filter_specs<'a>(
    candidates: &[SpecCandidate<'a>],
    configuration: &Configuration,
) -> Result<Vec<&'a Spec>, TagExpressionError> {
    let expression = match configuration.tags.as_deref() {
        Some(tags) if configuration.filter_specs && !tags.trim().is_empty() => {
            TagExpression::parse(tags)?
        }
        _ => return Ok(candidates.iter().map(|candidate| candidate.spec).collect()),
    };

    let kept: Vec<&Spec> = candidates
        .iter()
        .filter(|candidate| {
            if candidate.spec.is_feature() {
                candidate
                    .pickles
                    .iter()
                    .any(|pickle| expression.evaluate(&pickle.tag_names()[..]))
            } else {
                match configuration.filter_specs_mixed_mode {
                    FilterSpecsMixedMode::Hide => false,
                    FilterSpecsMixedMode::Show => true,
                    FilterSpecsMixedMode::EmptySet => expression.evaluate::<&str>(&[]),
                }
            }
        })
        .map(|candidate| candidate.spec)
        .collect();

    debug!(
        kept = kept.len(),
        dropped = candidates.len() - kept.len(),
        "filtered specs"
    );
    Ok(kept)
}
