//! Cucumber messages: the envelope data model and log-level passes.
//!
//! Everything here (de)serializes to the camelCase JSON schema used by other
//! Cucumber tooling, so logs produced here can be fed to standard formatters.

mod definitions;
mod envelope;
mod execution;
mod gherkin;
mod merge;
mod ndjson;
mod order;
mod pickle;

pub use definitions::*;
pub use envelope::{Envelope, EnvelopeKind};
pub use execution::*;
pub use gherkin::*;
pub use merge::{merge_messages, MergeError};
pub use ndjson::{parse_ndjson, read_envelopes, to_ndjson_string, write_envelopes, NdjsonError};
pub use order::{order_messages, remove_duplicated_step_definitions};
pub use pickle::*;

/// Version of the message protocol emitted in `meta`.
pub const PROTOCOL_VERSION: &str = "27.0.0";
