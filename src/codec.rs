// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Envelope codec: encodes Geomessages to the wire XML envelope and decodes
//! arbitrary received datagram text into zero or more Geomessages.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::geomessage::{Geomessage, TYPE_FIELD};

/// Envelope version attribute value emitted on every record element.
pub const ENVELOPE_VERSION: &str = "1.0";

const ENVELOPE_ROOT: &str = "geomessages";
const RECORD_ELEMENT: &str = "geomessage";
const LEGACY_RECORD_ELEMENT: &str = "message";

/// Error serializing an envelope. Fatal to the single send attempt.
#[derive(Debug, Clone, thiserror::Error)]
#[error("error writing geomessage envelope: {0}")]
pub struct EncodeError(pub(crate) String);

/// Error reading a received payload. Never surfaced to listeners; the
/// transport logs it and counts the datagram as undecodable.
#[derive(Debug, Clone, thiserror::Error)]
#[error("malformed geomessage payload: {0}")]
pub struct DecodeError(pub(crate) String);

/// Rewrites an external-dialect type name to its canonical form.
///
/// Applied to every decoded record: peers running the external adapter send
/// `trackrep` and `spotrep` where this library uses `position_report` and
/// `spot_report`.
pub fn normalize_inbound_type(type_name: &str) -> &str {
    match type_name {
        "trackrep" => "position_report",
        "spotrep" => "spot_report",
        other => other,
    }
}

/// Rewrites a canonical type name to the external-dialect form expected by
/// the external adapter.
pub fn external_type_name(type_name: &str) -> &str {
    match type_name {
        "position_report" => "trackrep",
        "spot_report" => "spotrep",
        other => other,
    }
}

/// Encodes a set of Geomessages into one wire envelope.
///
/// Produces UTF-8 XML of the form
/// `<geomessages><geomessage v="1.0"><field>text</field>…</geomessage>…</geomessages>`.
/// Field order follows the record's name ordering; receivers are
/// order-independent. Text values are XML-escaped.
pub fn encode(messages: &[Geomessage]) -> Result<Vec<u8>, EncodeError> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Start(BytesStart::new(ENVELOPE_ROOT)))
        .map_err(|e| EncodeError(e.to_string()))?;
    for message in messages {
        let mut record = BytesStart::new(RECORD_ELEMENT);
        record.push_attribute(("v", ENVELOPE_VERSION));
        writer
            .write_event(Event::Start(record))
            .map_err(|e| EncodeError(e.to_string()))?;
        for (name, value) in message.fields() {
            writer
                .write_event(Event::Start(BytesStart::new(name.as_str())))
                .map_err(|e| EncodeError(e.to_string()))?;
            writer
                .write_event(Event::Text(BytesText::new(value)))
                .map_err(|e| EncodeError(e.to_string()))?;
            writer
                .write_event(Event::End(BytesEnd::new(name.as_str())))
                .map_err(|e| EncodeError(e.to_string()))?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(RECORD_ELEMENT)))
            .map_err(|e| EncodeError(e.to_string()))?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(ENVELOPE_ROOT)))
        .map_err(|e| EncodeError(e.to_string()))?;
    Ok(writer.into_inner())
}

/// Encodes a single Geomessage into one wire envelope.
pub fn encode_one(message: &Geomessage) -> Result<Vec<u8>, EncodeError> {
    encode(std::slice::from_ref(message))
}

fn is_record_element(name: &str) -> bool {
    name.eq_ignore_ascii_case(RECORD_ELEMENT) || name.eq_ignore_ascii_case(LEGACY_RECORD_ELEMENT)
}

/// Decodes a received payload into Geomessages, in document order.
///
/// The root element may be named anything or be absent; each element named
/// `geomessage` or `message` (case-insensitive, any depth) becomes one
/// record. Every text-bearing child element of a record contributes a field;
/// character data split across several events is accumulated before the
/// field is committed. Unknown elements and attributes are ignored.
pub fn try_decode(payload: &str) -> Result<Vec<Geomessage>, DecodeError> {
    let mut reader = Reader::from_str(payload);
    reader.config_mut().trim_text(true);

    let mut messages: Vec<Geomessage> = Vec::new();
    let mut current: Option<Geomessage> = None;
    // Pending field: element name plus the text accumulated so far. Committed
    // only on the matching end tag so that split character data is not lost.
    let mut field: Option<(String, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if is_record_element(&name) {
                    if let Some(finished) = current.take() {
                        messages.push(finished);
                    }
                    current = Some(Geomessage::new());
                    field = None;
                } else if current.is_some() {
                    field = Some((name, String::new()));
                }
            }
            Ok(Event::Text(t)) => {
                if let Some((_, buffer)) = field.as_mut() {
                    let text = t.unescape().map_err(|e| DecodeError(e.to_string()))?;
                    buffer.push_str(&text);
                }
            }
            Ok(Event::CData(t)) => {
                if let Some((_, buffer)) = field.as_mut() {
                    buffer.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Ok(Event::Empty(e)) => {
                // a self-closed record element is still a (fieldless) record
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if is_record_element(&name) {
                    if let Some(finished) = current.take() {
                        messages.push(finished);
                    }
                    messages.push(Geomessage::new());
                    field = None;
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if is_record_element(&name) {
                    if let Some(finished) = current.take() {
                        messages.push(finished);
                    }
                    field = None;
                } else if let Some((field_name, value)) = field.take() {
                    if let Some(message) = current.as_mut() {
                        message.set_field(&field_name, &value);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DecodeError(e.to_string())),
            Ok(_) => {}
        }
    }
    if let Some(unterminated) = current.take() {
        messages.push(unterminated);
    }

    for message in &mut messages {
        let normalized = message
            .field(TYPE_FIELD)
            .map(|t| normalize_inbound_type(t).to_string());
        if let Some(normalized) = normalized {
            message.set_field(TYPE_FIELD, &normalized);
        }
    }
    Ok(messages)
}

/// Tolerant variant of [`try_decode`]: malformed payloads yield an empty
/// sequence instead of an error.
pub fn decode(payload: &str) -> Vec<Geomessage> {
    match try_decode(payload) {
        Ok(messages) => messages,
        Err(err) => {
            log::debug!("discarding undecodable payload: {err}");
            Vec::new()
        }
    }
}
