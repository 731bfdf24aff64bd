//! Tag handling: tag expressions for filtering, tag-borne test options.

mod expression;
mod options;

pub use expression::{TagExpression, TagExpressionError};
pub use options::{
    is_suite_only, looks_like_option, tag_to_option, TagOptionError, TestOptions,
};

/// Tags that focus a run on the tagged scenarios.
pub const FOCUS_TAGS: &[&str] = &["@only", "@focus"];

/// Tag that skips a scenario regardless of the filter.
pub const SKIP_TAG: &str = "@skip";
