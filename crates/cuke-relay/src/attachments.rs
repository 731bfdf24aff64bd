//! Attachments made from inside handlers.
//!
//! Handlers never talk to the reconciler directly. They push into an
//! [`Attachments`] buffer which the composer flushes while the step (or run
//! hook) is still open.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::messages::AttachmentContentEncoding;

/// Media type used by [`Attach::log`].
pub const LOG_MEDIA_TYPE: &str = "text/x.cucumber.log+plain";

/// A media type prefixed with this marks data that is already base64.
const BASE64_PREFIX: &str = "base64:";

/// A single attachment, not yet tied to a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringAttachment {
    pub data: String,
    pub media_type: String,
    pub encoding: AttachmentContentEncoding,
    pub file_name: Option<String>,
}

/// Buffer of attachments collected during one handler invocation.
#[derive(Debug, Default, Clone)]
pub struct Attachments {
    items: Vec<StringAttachment>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, attachment: StringAttachment) {
        self.items.push(attachment);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, StringAttachment> {
        self.items.drain(..)
    }

    pub fn into_vec(self) -> Vec<StringAttachment> {
        self.items
    }
}

/// Attachment API shared by every handler parameter.
pub trait Attach {
    fn attachments(&mut self) -> &mut Attachments;

    /// Attach a string. A `base64:`-prefixed media type marks `data` as
    /// already encoded.
    fn attach(&mut self, data: &str, media_type: &str) {
        let attachment = match media_type.strip_prefix(BASE64_PREFIX) {
            Some(media_type) => StringAttachment {
                data: data.to_string(),
                media_type: media_type.to_string(),
                encoding: AttachmentContentEncoding::Base64,
                file_name: None,
            },
            None => StringAttachment {
                data: data.to_string(),
                media_type: media_type.to_string(),
                encoding: AttachmentContentEncoding::Identity,
                file_name: None,
            },
        };
        self.attachments().push(attachment);
    }

    /// Attach raw bytes, base64-encoded on the way in.
    fn attach_bytes(&mut self, data: &[u8], media_type: &str) {
        self.attachments().push(StringAttachment {
            data: STANDARD.encode(data),
            media_type: media_type.to_string(),
            encoding: AttachmentContentEncoding::Base64,
            file_name: None,
        });
    }

    fn attach_file(&mut self, data: &[u8], media_type: &str, file_name: &str) {
        self.attachments().push(StringAttachment {
            data: STANDARD.encode(data),
            media_type: media_type.to_string(),
            encoding: AttachmentContentEncoding::Base64,
            file_name: Some(file_name.to_string()),
        });
    }

    fn log(&mut self, text: &str) {
        self.attach(text, LOG_MEDIA_TYPE);
    }
}

impl Attach for Attachments {
    fn attachments(&mut self) -> &mut Attachments {
        self
    }
}
