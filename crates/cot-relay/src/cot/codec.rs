// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! CoT XML encoding and decoding.
//!
//! One document per event:
//! ```text
//! +----------------------------+-------------------------+
//! | optional <?xml ...?> prolog | <event ...> ... </event> |
//! +----------------------------+-------------------------+
//! ```

use super::{CotMessage, Event};
use bytes::Bytes;
use thiserror::Error;

/// Prolog prepended to every encoded event.
const XML_PROLOG: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Uid carried by every pong.
pub const PONG_UID: &str = "takPong";

/// Codec and framing errors.
#[derive(Debug, Clone, Error)]
pub enum CotError {
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Framing error: {0}")]
    Framing(String),
}

/// Decode one XML document into an [`Event`].
pub fn decode(bytes: &[u8]) -> Result<Event, CotError> {
    let text = std::str::from_utf8(bytes)?;
    let event: Event =
        quick_xml::de::from_str(text).map_err(|e| CotError::Decode(e.to_string()))?;

    if event.uid.is_empty() {
        return Err(CotError::Decode("event without uid".into()));
    }
    if event.cot_type.is_empty() {
        return Err(CotError::Decode("event without type".into()));
    }

    Ok(event)
}

/// Decode one XML document and classify it, keeping the original bytes.
pub fn decode_message(raw: Bytes) -> Result<CotMessage, CotError> {
    let event = decode(&raw)?;
    Ok(CotMessage::new(event, raw))
}

/// Encode an [`Event`] as a standalone XML document.
pub fn encode(event: &Event) -> Result<Bytes, CotError> {
    let body = quick_xml::se::to_string(event).map_err(|e| CotError::Encode(e.to_string()))?;

    let mut out = String::with_capacity(XML_PROLOG.len() + body.len());
    out.push_str(XML_PROLOG);
    out.push_str(&body);
    Ok(Bytes::from(out))
}

/// Build the keepalive reply sent in answer to a ping.
pub fn make_pong() -> Event {
    let mut event = Event::new(super::PONG_TYPE, PONG_UID, chrono::Duration::seconds(20));
    event.how = "h-g-i-g-o".to_string();
    event
}
