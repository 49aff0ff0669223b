// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cursor-on-Target event model.
//!
//! Events are XML documents of the form:
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <event version="2.0" uid="ANDROID-1" type="a-f-G-U-C" how="m-g"
//!        time="..." start="..." stale="...">
//!   <point lat="48.85" lon="2.35" hae="35.0" ce="9999999" le="9999999"/>
//!   <detail>
//!     <contact callsign="ALPHA"/>
//!     <marti><dest callsign="BRAVO"/></marti>
//!   </detail>
//! </event>
//! ```
//!
//! Only the parts the relay acts on are modelled. Everything else in
//! `<detail>` is ignored on decode; inbound traffic is always forwarded as the
//! original bytes.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod codec;
pub mod framing;

pub use codec::{decode, decode_message, encode, make_pong, CotError};
pub use framing::EventFramer;

/// Type tag of the keepalive ping.
pub const PING_TYPE: &str = "t-x-c-t";

/// Type tag of the keepalive reply.
pub const PONG_TYPE: &str = "t-x-c-t-r";

/// Prefix of the unit/position family (`a-f-G-U-C`, `a-h-A`, ...).
pub const UNIT_PREFIX: &str = "a-";

/// Prefix of the point/bulletin family (`b-m-p-s-m`, `b-t-f`, ...).
pub const POINT_PREFIX: &str = "b-";

/// Message family, decided once when an event is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Keepalive ping, answered with a pong and never forwarded.
    Ping,
    /// Chat message (carries a `__chat` detail).
    Chat,
    /// Position report of a unit (`a-` family).
    Unit,
    /// Point of interest or bulletin (`b-` family).
    Point,
    /// Anything else; forwarded untouched.
    Other,
}

impl MessageKind {
    /// Classify an event. First match wins: ping, chat, unit, point.
    pub fn classify(event: &Event) -> Self {
        if event.cot_type == PING_TYPE {
            Self::Ping
        } else if event.is_chat() {
            Self::Chat
        } else if event.cot_type.starts_with(UNIT_PREFIX) {
            Self::Unit
        } else if event.cot_type.starts_with(POINT_PREFIX) {
            Self::Point
        } else {
            Self::Other
        }
    }

    /// Whether events of this kind update the unit registry.
    pub fn is_tracked(self) -> bool {
        matches!(self, Self::Unit | Self::Point)
    }
}

/// A decoded inbound event together with its original wire bytes.
#[derive(Debug, Clone)]
pub struct CotMessage {
    pub event: Event,
    pub kind: MessageKind,
    pub raw: Bytes,
}

impl CotMessage {
    pub fn new(event: Event, raw: Bytes) -> Self {
        let kind = MessageKind::classify(&event);
        Self { event, kind, raw }
    }
}

/// CoT `<event>` element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "event")]
pub struct Event {
    #[serde(rename = "@version", default = "default_version")]
    pub version: String,

    #[serde(rename = "@uid")]
    pub uid: String,

    #[serde(rename = "@type")]
    pub cot_type: String,

    #[serde(rename = "@how", default)]
    pub how: String,

    #[serde(rename = "@time", default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    #[serde(rename = "@start", default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,

    #[serde(rename = "@stale", default, skip_serializing_if = "Option::is_none")]
    pub stale: Option<DateTime<Utc>>,

    #[serde(default)]
    pub point: Point,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Detail>,
}

fn default_version() -> String {
    "2.0".to_string()
}

impl Event {
    /// Create a bare event of the given type stamped with the current time.
    pub fn new(cot_type: impl Into<String>, uid: impl Into<String>, stale_in: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            version: default_version(),
            uid: uid.into(),
            cot_type: cot_type.into(),
            how: String::new(),
            time: Some(now),
            start: Some(now),
            stale: Some(now + stale_in),
            point: Point::default(),
            detail: None,
        }
    }

    pub fn is_chat(&self) -> bool {
        self.detail.as_ref().is_some_and(|d| d.chat.is_some())
    }

    /// Callsign from `<contact>`, if any.
    pub fn callsign(&self) -> Option<&str> {
        self.detail
            .as_ref()
            .and_then(|d| d.contact.as_ref())
            .map(|c| c.callsign.as_str())
            .filter(|c| !c.is_empty())
    }

    /// Explicit recipient callsigns from `<marti><dest callsign=".."/></marti>`.
    pub fn recipient_callsigns(&self) -> Vec<&str> {
        self.detail
            .as_ref()
            .and_then(|d| d.marti.as_ref())
            .map(|m| {
                m.dest
                    .iter()
                    .filter_map(|d| d.callsign.as_deref())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Free text from `<remarks>`.
    pub fn text(&self) -> Option<&str> {
        self.detail
            .as_ref()
            .and_then(|d| d.remarks.as_ref())
            .map(|r| r.text.trim())
            .filter(|t| !t.is_empty())
    }
}

/// CoT `<point>` element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(rename = "@lat", default)]
    pub lat: f64,
    #[serde(rename = "@lon", default)]
    pub lon: f64,
    #[serde(rename = "@hae", default)]
    pub hae: f64,
    #[serde(rename = "@ce", default = "unknown_error")]
    pub ce: f64,
    #[serde(rename = "@le", default = "unknown_error")]
    pub le: f64,
}

/// CoT convention for "error unknown".
fn unknown_error() -> f64 {
    9_999_999.0
}

impl Default for Point {
    fn default() -> Self {
        Self {
            lat: 0.0,
            lon: 0.0,
            hae: 0.0,
            ce: unknown_error(),
            le: unknown_error(),
        }
    }
}

/// CoT `<detail>` element (subset).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,

    #[serde(rename = "__group", default, skip_serializing_if = "Option::is_none")]
    pub group: Option<Group>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<Track>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<Remarks>,

    #[serde(rename = "__chat", default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<Chat>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marti: Option<Marti>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(rename = "@callsign", default)]
    pub callsign: String,
    #[serde(rename = "@endpoint", default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Team membership (`__group`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@role", default)]
    pub role: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(rename = "@course", default)]
    pub course: f64,
    #[serde(rename = "@speed", default)]
    pub speed: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Remarks {
    #[serde(rename = "@source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "@to", default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(rename = "$text", default)]
    pub text: String,
}

/// GeoChat header (`__chat`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    #[serde(rename = "@id", default)]
    pub id: String,
    #[serde(rename = "@chatroom", default)]
    pub chatroom: String,
    #[serde(rename = "@senderCallsign", default)]
    pub sender_callsign: String,
    #[serde(rename = "@parent", default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(rename = "@groupOwner", default, skip_serializing_if = "Option::is_none")]
    pub group_owner: Option<String>,
}

/// Explicit addressing (`marti`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Marti {
    #[serde(rename = "dest", default)]
    pub dest: Vec<Dest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dest {
    #[serde(rename = "@callsign", default, skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,
    #[serde(rename = "@uid", default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}
