//! Console lines and their wire encoding
//!
//! Jobs write [`ConsoleLine`]s, which always carry their text inline. The
//! store persists [`LineRecord`]s, whose payload is either the inline text
//! or a reference token pointing into the session's metadata hash. Only the
//! store's compaction step creates references, so a caller can never hand a
//! reference to the store.
//!
//! ## Wire format
//!
//! Records are encoded as compact JSON with one-letter field names:
//!
//! ```text
//! {"t":1.25,"r":true,"s":"<text or token>","c":"#ff0000","p":42.0,"n":"upload"}
//! ```
//!
//! `r` is only present for references; `c`, `p` and `n` only when set.

use serde::{Deserialize, Serialize};

use crate::color::TextColor;
use crate::error::CodecError;

/// Message value reserved for the primary progress bar
pub const PRIMARY_PROGRESS_ID: &str = "1";

/// A line of console output as written by a job
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConsoleLine {
    /// Line text, or the progress bar id for progress updates
    pub message: String,
    /// Progress bar name (sent with the first update only)
    pub progress_name: Option<String>,
    /// Progress value in `[0, 100]`; stores reject anything else, NaN included
    pub progress_value: Option<f64>,
    /// HTML color of the line
    pub text_color: Option<String>,
    /// Seconds since the session started
    pub time_offset: f64,
}

impl ConsoleLine {
    /// Create a text line
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Create a progress update for the bar with the given id
    pub fn progress(bar_id: impl Into<String>, value: f64) -> Self {
        Self {
            message: bar_id.into(),
            progress_value: Some(value),
            ..Default::default()
        }
    }

    /// Set the line color
    pub fn with_color(mut self, color: Option<TextColor>) -> Self {
        self.text_color = color.map(|c| c.to_string());
        self
    }

    /// Set the progress bar name
    pub fn with_progress_name(mut self, name: Option<String>) -> Self {
        self.progress_name = name;
        self
    }

    /// Set the time offset
    pub fn at(mut self, time_offset: f64) -> Self {
        self.time_offset = time_offset;
        self
    }

    /// Whether this line is a progress update
    pub fn is_progress(&self) -> bool {
        self.progress_value.is_some()
    }

    /// Whether this line updates the primary progress bar
    pub fn is_primary_progress(&self) -> bool {
        self.is_progress() && self.message == PRIMARY_PROGRESS_ID
    }
}

/// Message payload of a stored line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinePayload {
    /// The message text itself
    Inline(String),
    /// Token of a metadata hash field holding the message text
    Reference(String),
}

impl LinePayload {
    /// The raw string stored in the record (text or token)
    pub fn as_str(&self) -> &str {
        match self {
            LinePayload::Inline(text) => text,
            LinePayload::Reference(token) => token,
        }
    }

    /// Whether the payload is a reference
    pub fn is_reference(&self) -> bool {
        matches!(self, LinePayload::Reference(_))
    }
}

/// A line as stored in a session's ordered log
#[derive(Debug, Clone, PartialEq)]
pub struct LineRecord {
    pub payload: LinePayload,
    pub progress_name: Option<String>,
    pub progress_value: Option<f64>,
    pub text_color: Option<String>,
    pub time_offset: f64,
}

impl LineRecord {
    /// Record carrying the line's message inline
    pub fn inline(line: &ConsoleLine) -> Self {
        Self::with_payload(line, LinePayload::Inline(line.message.clone()))
    }

    /// Record whose message was moved to the metadata hash under `token`
    pub fn referencing(line: &ConsoleLine, token: impl Into<String>) -> Self {
        Self::with_payload(line, LinePayload::Reference(token.into()))
    }

    fn with_payload(line: &ConsoleLine, payload: LinePayload) -> Self {
        Self {
            payload,
            progress_name: line.progress_name.clone(),
            progress_value: line.progress_value,
            text_color: line.text_color.clone(),
            time_offset: line.time_offset,
        }
    }

    /// Encode the record to its wire form
    pub fn encode(&self) -> Result<String, CodecError> {
        let wire = WireLineRef {
            time_offset: self.time_offset,
            is_reference: self.payload.is_reference(),
            message: self.payload.as_str(),
            text_color: self.text_color.as_deref(),
            progress_value: self.progress_value,
            progress_name: self.progress_name.as_deref(),
        };
        serde_json::to_string(&wire).map_err(|e| CodecError::encode(e.to_string()))
    }

    /// Decode a record from its wire form
    pub fn decode(value: &str) -> Result<Self, CodecError> {
        let wire: WireLine =
            serde_json::from_str(value).map_err(|e| CodecError::decode(e.to_string()))?;

        let payload = if wire.is_reference {
            LinePayload::Reference(wire.message)
        } else {
            LinePayload::Inline(wire.message)
        };

        Ok(Self {
            payload,
            progress_name: wire.progress_name,
            progress_value: wire.progress_value,
            text_color: wire.text_color,
            time_offset: wire.time_offset,
        })
    }

    /// Convert into a console line, using `message` as the line text
    ///
    /// For inline records this is normally the inline text; for references it
    /// is the dereferenced payload (or the raw token when it could not be
    /// resolved).
    pub fn into_line_with(self, message: String) -> ConsoleLine {
        ConsoleLine {
            message,
            progress_name: self.progress_name,
            progress_value: self.progress_value,
            text_color: self.text_color,
            time_offset: self.time_offset,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Serialize)]
struct WireLineRef<'a> {
    #[serde(rename = "t")]
    time_offset: f64,
    #[serde(rename = "r", skip_serializing_if = "is_false")]
    is_reference: bool,
    #[serde(rename = "s")]
    message: &'a str,
    #[serde(rename = "c", skip_serializing_if = "Option::is_none")]
    text_color: Option<&'a str>,
    #[serde(rename = "p", skip_serializing_if = "Option::is_none")]
    progress_value: Option<f64>,
    #[serde(rename = "n", skip_serializing_if = "Option::is_none")]
    progress_name: Option<&'a str>,
}

#[derive(Deserialize)]
struct WireLine {
    #[serde(rename = "t", default)]
    time_offset: f64,
    #[serde(rename = "r", default)]
    is_reference: bool,
    #[serde(rename = "s")]
    message: String,
    #[serde(rename = "c", default)]
    text_color: Option<String>,
    #[serde(rename = "p", default)]
    progress_value: Option<f64>,
    #[serde(rename = "n", default)]
    progress_name: Option<String>,
}
