//! Internal assertion errors.
//!
//! These represent states that should be impossible under correct usage
//! (malformed input, violated preconditions). They are never retried and
//! always carry a pointer to the issue tracker.

use std::fmt;

/// Where bug reports should go.
pub const HOMEPAGE: &str = "https://github.com/cuke-relay/cuke-relay";

/// An internal inconsistency ("expected to find X").
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CucumberError {
    #[error("{0} (this might be a bug, please report at {homepage})", homepage = HOMEPAGE)]
    Assertion(String),
}

impl CucumberError {
    /// The bare assertion text, without the bug-report suffix.
    pub fn detail(&self) -> &str {
        match self {
            CucumberError::Assertion(message) => message,
        }
    }
}

/// Build an assertion error.
pub fn fail(message: impl fmt::Display) -> CucumberError {
    CucumberError::Assertion(message.to_string())
}

/// Fail unless `condition` holds.
pub fn assert_that(condition: bool, message: &str) -> Result<(), CucumberError> {
    if condition {
        Ok(())
    } else {
        Err(fail(message))
    }
}

/// Turn an absent value into an assertion error.
pub trait Ensure<T> {
    fn ensure(self, message: &str) -> Result<T, CucumberError>;

    fn ensure_with<F>(self, message: F) -> Result<T, CucumberError>
    where
        F: FnOnce() -> String;
}

impl<T> Ensure<T> for Option<T> {
    fn ensure(self, message: &str) -> Result<T, CucumberError> {
        self.ok_or_else(|| fail(message))
    }

    fn ensure_with<F>(self, message: F) -> Result<T, CucumberError>
    where
        F: FnOnce() -> String,
    {
        self.ok_or_else(|| fail(message()))
    }
}
