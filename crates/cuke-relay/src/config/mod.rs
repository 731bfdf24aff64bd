//! Configuration types and resolution.
//!
//! A value is taken from, in order: environment overrides, the section of
//! the active testing type (`e2e` / `component`), the top level of the
//! configuration file, and finally the defaults.

mod decode;
mod user;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub use decode::{stringish_to_boolean, DecodeError};
pub use user::{
    BaseConfiguration, EnvironmentOverrides, PartialAttachments, PartialOutput, UserConfiguration,
};

use crate::paths::ensure_is_relative;

const DEFAULT_STEP_DEFINITIONS: [&str; 3] = [
    "[integration-directory]/[filepath]/**/*.rs",
    "[integration-directory]/[filepath].rs",
    "tests/support/step_definitions/**/*.rs",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Invalid(#[from] DecodeError),
}

/// What to do with non-feature specs when filtering by tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterSpecsMixedMode {
    #[default]
    Hide,
    Show,
    EmptySet,
}

impl FilterSpecsMixedMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterSpecsMixedMode::Hide => "hide",
            FilterSpecsMixedMode::Show => "show",
            FilterSpecsMixedMode::EmptySet => "empty-set",
        }
    }
}

impl FromStr for FilterSpecsMixedMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "hide" => Ok(FilterSpecsMixedMode::Hide),
            "show" => Ok(FilterSpecsMixedMode::Show),
            "empty-set" => Ok(FilterSpecsMixedMode::EmptySet),
            other => Err(format!("unknown mixed mode '{other}'")),
        }
    }
}

impl fmt::Display for FilterSpecsMixedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestingType {
    #[default]
    E2e,
    Component,
}

impl FromStr for TestingType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "e2e" => Ok(TestingType::E2e),
            "component" => Ok(TestingType::Component),
            other => Err(format!("unknown testing type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateConfiguration {
    pub soft_errors: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfiguration {
    pub enabled: bool,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrettyConfiguration {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentsConfiguration {
    pub add_screenshots: bool,
    pub add_videos: bool,
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub step_definitions: Vec<String>,
    pub state: StateConfiguration,
    pub messages: OutputConfiguration,
    pub json: OutputConfiguration,
    pub html: OutputConfiguration,
    pub usage: OutputConfiguration,
    /// Pretty output is rendered elsewhere. It still counts as an output
    /// when deciding whether to track state.
    pub pretty: PrettyConfiguration,
    pub filter_specs_mixed_mode: FilterSpecsMixedMode,
    pub filter_specs: bool,
    pub omit_filtered: bool,
    pub dry_run: bool,
    pub attachments: AttachmentsConfiguration,
    pub implicit_integration_folder: PathBuf,
    /// Tag expression from the environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

impl Configuration {
    /// Whether the reconciler has anything to do: a non-interactive run
    /// with at least one report enabled.
    pub fn is_tracking_state(&self, text_terminal: bool) -> bool {
        text_terminal
            && (self.messages.enabled
                || self.json.enabled
                || self.html.enabled
                || self.pretty.enabled
                || self.usage.enabled)
    }
}

/// Where the configuration is being resolved for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeContext {
    pub testing_type: TestingType,
    pub project_root: PathBuf,
    /// Folder the feature files live in.
    pub implicit_integration_folder: PathBuf,
}

/// Merge the user's configuration and the environment into a complete one.
pub fn combine(
    user: &UserConfiguration,
    overrides: &EnvironmentOverrides,
    runtime: &RuntimeContext,
) -> Configuration {
    let specific = match runtime.testing_type {
        TestingType::E2e => user.e2e.as_ref(),
        TestingType::Component => user.component.as_ref(),
    };
    let unspecific = &user.base;

    // environment, then the testing type's section, then the top level
    macro_rules! pick {
        ($override:expr, |$section:ident| $field:expr) => {
            $override
                .clone()
                .or_else(|| specific.and_then(|$section| $field.clone()))
                .or_else(|| {
                    let $section = unspecific;
                    $field.clone()
                })
        };
    }

    let integration =
        ensure_is_relative(&runtime.project_root, &runtime.implicit_integration_folder);
    let integration = integration.to_string_lossy();
    let step_definitions = pick!(overrides.step_definitions, |section| section.step_definitions)
        .unwrap_or_else(|| {
            DEFAULT_STEP_DEFINITIONS
                .iter()
                .map(|pattern| pattern.replace("[integration-directory]", &integration))
                .collect()
        });

    let output = |enabled: Option<bool>, output: Option<String>, default: &str| {
        OutputConfiguration {
            enabled: enabled.unwrap_or(false),
            output: output.unwrap_or_else(|| default.to_string()),
        }
    };

    Configuration {
        step_definitions,
        state: StateConfiguration {
            soft_errors: pick!(overrides.state_soft_errors, |section| section.soft_errors)
                .unwrap_or(false),
        },
        messages: output(
            pick!(overrides.messages_enabled, |section| section.messages.enabled),
            pick!(overrides.messages_output, |section| section.messages.output),
            "cucumber-messages.ndjson",
        ),
        json: output(
            pick!(overrides.json_enabled, |section| section.json.enabled),
            pick!(overrides.json_output, |section| section.json.output),
            "cucumber-report.json",
        ),
        html: output(
            pick!(overrides.html_enabled, |section| section.html.enabled),
            pick!(overrides.html_output, |section| section.html.output),
            "cucumber-report.html",
        ),
        usage: output(
            pick!(overrides.usage_enabled, |section| section.usage.enabled),
            pick!(overrides.usage_output, |section| section.usage.output),
            "stdout",
        ),
        pretty: PrettyConfiguration {
            enabled: pick!(overrides.pretty_enabled, |section| section.pretty).unwrap_or(false),
        },
        filter_specs_mixed_mode: pick!(overrides.filter_specs_mixed_mode, |section| section
            .filter_specs_mixed_mode)
        .unwrap_or_default(),
        filter_specs: pick!(overrides.filter_specs, |section| section.filter_specs)
            .unwrap_or(false),
        omit_filtered: pick!(overrides.omit_filtered, |section| section.omit_filtered)
            .unwrap_or(false),
        dry_run: pick!(overrides.dry_run, |section| section.dry_run).unwrap_or(false),
        attachments: AttachmentsConfiguration {
            add_screenshots: pick!(overrides.attachments_add_screenshots, |section| section
                .attachments
                .add_screenshots)
            .unwrap_or(true),
            add_videos: pick!(overrides.attachments_add_videos, |section| section
                .attachments
                .add_videos)
            .unwrap_or(false),
        },
        implicit_integration_folder: runtime.implicit_integration_folder.clone(),
        tags: overrides.tags.clone(),
    }
}

/// Read a YAML or JSON configuration file. `.json` files are parsed as JSON,
/// anything else as YAML.
pub fn load_file(path: &Path) -> Result<UserConfiguration, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let value: Value = if path.extension().is_some_and(|extension| extension == "json") {
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?
    };

    let configuration = UserConfiguration::decode(&value)?;
    debug!(path = %path.display(), ?configuration, "resolved explicit user configuration");
    Ok(configuration)
}

/// Resolve the configuration from an optional file and the environment.
pub fn resolve(
    file: Option<&Path>,
    environment: &Map<String, Value>,
    runtime: &RuntimeContext,
) -> Result<Configuration, ConfigError> {
    let overrides = EnvironmentOverrides::decode(environment)?;
    debug!(?overrides, "resolved environment overrides");

    let user = match file {
        Some(path) => load_file(path)?,
        None => {
            debug!("resolved no explicit user configuration");
            UserConfiguration::default()
        }
    };

    let configuration = combine(&user, &overrides, runtime);
    debug!(?configuration, "resolved configuration");
    Ok(configuration)
}
