//! Gherkin specifications as host-runner suites, and the Cucumber message
//! log describing their execution.
//!
//! Two engines do the work:
//!
//! - [`composer`] turns a parsed document and its pickles into a suite tree
//!   with hooks, tag filtering and retries, emitting a task per execution
//!   signal
//! - [`reconciler`] folds those tasks, reloads and retries included, into one
//!   ordered message log and writes it out at the end of the run
//!
//! [`session::Session`] wires both together for an in-process run.

// ===== Messages and identifiers =====
pub mod ids;
pub mod messages;
pub mod time;

// ===== Gherkin helpers =====
pub mod ast;
pub mod pickles;

// ===== Matching =====
pub mod expressions;
pub mod tags;

// ===== Step definitions and hooks =====
pub mod attachments;
pub mod registry;
pub mod snippets;

// ===== Engines =====
pub mod composer;
pub mod reconciler;
pub mod runner;
pub mod tasks;

// ===== Run setup =====
pub mod config;
pub mod paths;
pub mod session;
pub mod specs;

pub mod error;

#[cfg(test)]
mod testing;

pub use error::CucumberError;
pub use session::{Session, SessionError, SessionOptions, SpecSource};
