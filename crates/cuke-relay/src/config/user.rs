//! Partial configuration as written by the user or passed through the
//! environment. Every field is optional; resolution fills in the rest.

use serde_json::{Map, Value};

use super::decode::{self, DecodeError, Partial};
use super::FilterSpecsMixedMode;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialOutput {
    pub enabled: Option<bool>,
    pub output: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialAttachments {
    pub add_screenshots: Option<bool>,
    pub add_videos: Option<bool>,
}

/// Keys accepted at the top level and in the `e2e` / `component` sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseConfiguration {
    pub step_definitions: Option<Vec<String>>,
    pub soft_errors: Option<bool>,
    pub messages: PartialOutput,
    pub json: PartialOutput,
    pub html: PartialOutput,
    pub usage: PartialOutput,
    pub pretty: Option<bool>,
    pub filter_specs_mixed_mode: Option<FilterSpecsMixedMode>,
    pub filter_specs: Option<bool>,
    pub omit_filtered: Option<bool>,
    pub dry_run: Option<bool>,
    pub attachments: PartialAttachments,
}

/// The configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserConfiguration {
    pub base: BaseConfiguration,
    pub e2e: Option<BaseConfiguration>,
    pub component: Option<BaseConfiguration>,
}

fn output(value: &Value) -> Result<PartialOutput, DecodeError> {
    let mut object = Partial::new(value)?;
    let output = PartialOutput {
        enabled: object.field("enabled", decode::boolean),
        output: object.field("output", decode::string),
    };
    object.finish(output)
}

fn mixed_mode(value: &Value) -> Result<FilterSpecsMixedMode, DecodeError> {
    value
        .as_str()
        .and_then(|mode| mode.parse().ok())
        .ok_or_else(|| DecodeError::expected(value, "\"hide\" | \"show\" | \"empty-set\""))
}

fn base_fields(object: &mut Partial<'_>) -> BaseConfiguration {
    BaseConfiguration {
        step_definitions: object.field("stepDefinitions", decode::patterns),
        soft_errors: object
            .field("state", |state| {
                let mut state = Partial::new(state)?;
                let soft_errors = state.field("softErrors", decode::boolean);
                state.finish(soft_errors)
            })
            .flatten(),
        messages: object.field("messages", output).unwrap_or_default(),
        json: object.field("json", output).unwrap_or_default(),
        html: object.field("html", output).unwrap_or_default(),
        usage: object.field("usage", output).unwrap_or_default(),
        pretty: object
            .field("pretty", |pretty| {
                let mut pretty = Partial::new(pretty)?;
                let enabled = pretty.field("enabled", decode::boolean);
                pretty.finish(enabled)
            })
            .flatten(),
        filter_specs_mixed_mode: object.field("filterSpecsMixedMode", mixed_mode),
        filter_specs: object.field("filterSpecs", decode::boolean),
        omit_filtered: object.field("omitFiltered", decode::boolean),
        dry_run: object.field("dryRun", decode::boolean),
        attachments: object
            .field("attachments", |attachments| {
                let mut attachments = Partial::new(attachments)?;
                let decoded = PartialAttachments {
                    add_screenshots: attachments.field("addScreenshots", decode::boolean),
                    add_videos: attachments.field("addVideos", decode::boolean),
                };
                attachments.finish(decoded)
            })
            .unwrap_or_default(),
    }
}

fn base(value: &Value) -> Result<BaseConfiguration, DecodeError> {
    let mut object = Partial::new(value)?;
    let base = base_fields(&mut object);
    object.finish(base)
}

impl UserConfiguration {
    pub fn decode(value: &Value) -> Result<Self, DecodeError> {
        let mut object = Partial::new(value)?;
        let configuration = UserConfiguration {
            base: base_fields(&mut object),
            e2e: object.field("e2e", base),
            component: object.field("component", base),
        };
        object.finish(configuration)
    }
}

fn flag(object: &mut Partial<'_>, name: &str) -> Option<bool> {
    object.field(name, decode::stringish).flatten()
}

/// Overrides passed through the host's environment. Booleans may be given
/// as strings, see [`decode::stringish_to_boolean`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentOverrides {
    pub step_definitions: Option<Vec<String>>,
    pub state_soft_errors: Option<bool>,
    pub messages_enabled: Option<bool>,
    pub messages_output: Option<String>,
    pub json_enabled: Option<bool>,
    pub json_output: Option<String>,
    pub html_enabled: Option<bool>,
    pub html_output: Option<String>,
    pub usage_enabled: Option<bool>,
    pub usage_output: Option<String>,
    pub pretty_enabled: Option<bool>,
    pub filter_specs_mixed_mode: Option<FilterSpecsMixedMode>,
    pub filter_specs: Option<bool>,
    pub omit_filtered: Option<bool>,
    pub dry_run: Option<bool>,
    pub attachments_add_screenshots: Option<bool>,
    pub attachments_add_videos: Option<bool>,
    pub tags: Option<String>,
}

impl EnvironmentOverrides {
    pub fn decode(environment: &Map<String, Value>) -> Result<Self, DecodeError> {
        let value = Value::Object(environment.clone());
        let mut object = Partial::new(&value)?;

        let overrides = EnvironmentOverrides {
            step_definitions: object.field("stepDefinitions", decode::patterns),
            state_soft_errors: flag(&mut object, "stateSoftErrors"),
            messages_enabled: flag(&mut object, "messagesEnabled"),
            messages_output: object.field("messagesOutput", decode::string),
            json_enabled: flag(&mut object, "jsonEnabled"),
            json_output: object.field("jsonOutput", decode::string),
            html_enabled: flag(&mut object, "htmlEnabled"),
            html_output: object.field("htmlOutput", decode::string),
            usage_enabled: flag(&mut object, "usageEnabled"),
            usage_output: object.field("usageOutput", decode::string),
            pretty_enabled: flag(&mut object, "prettyEnabled"),
            filter_specs_mixed_mode: object.field("filterSpecsMixedMode", mixed_mode),
            filter_specs: flag(&mut object, "filterSpecs"),
            omit_filtered: flag(&mut object, "omitFiltered"),
            dry_run: flag(&mut object, "dryRun"),
            attachments_add_screenshots: flag(&mut object, "attachmentsAddScreenshots"),
            attachments_add_videos: flag(&mut object, "attachmentsAddVideos"),
            tags: object.field("tags", decode::string),
        };
        object.finish(overrides)
    }
}
