//! Normalization passes over an envelope log.

use std::collections::HashMap;

use super::{Envelope, Location, SOURCE_NOT_AVAILABLE};

/// Stable sort that moves structural envelopes (meta, source, document,
/// pickle, parameter type, step definition, hook, run start, test case) in
/// that order ahead of everything else. Run-time envelopes keep their
/// relative arrival order.
pub fn order_messages(mut envelopes: Vec<Envelope>) -> Vec<Envelope> {
    envelopes.sort_by_key(|envelope| {
        envelope
            .kind()
            .structural_priority()
            .map_or(u16::MAX, u16::from)
    });
    envelopes
}

/// Collapse step definitions that share a source position.
///
/// Every spec re-registers the same glue, so a merged log carries one
/// `stepDefinition` per spec for each definition. Later copies are dropped
/// and every test case, wherever it sits in the log, is rewritten to
/// reference the first one. Definitions without a known source are left
/// alone.
pub fn remove_duplicated_step_definitions(envelopes: Vec<Envelope>) -> Vec<Envelope> {
    let mut seen: HashMap<(String, Option<Location>), String> = HashMap::new();
    let mut replacements: HashMap<String, String> = HashMap::new();

    for envelope in &envelopes {
        if let Envelope::StepDefinition(definition) = envelope {
            let uri = definition.source_reference.uri.clone().unwrap_or_default();
            if uri == SOURCE_NOT_AVAILABLE {
                continue;
            }
            let key = (uri, definition.source_reference.location);
            match seen.get(&key) {
                Some(first) => {
                    replacements.insert(definition.id.clone(), first.clone());
                }
                None => {
                    seen.insert(key, definition.id.clone());
                }
            }
        }
    }

    if replacements.is_empty() {
        return envelopes;
    }

    envelopes
        .into_iter()
        .filter_map(|mut envelope| {
            match &mut envelope {
                Envelope::StepDefinition(definition)
                    if replacements.contains_key(&definition.id) =>
                {
                    return None;
                }
                Envelope::TestCase(test_case) => {
                    for step in &mut test_case.test_steps {
                        for id in step.step_definition_ids.iter_mut().flatten() {
                            if let Some(replacement) = replacements.get(id) {
                                *id = replacement.clone();
                            }
                        }
                    }
                }
                _ => {}
            }
            Some(envelope)
        })
        .collect()
}
