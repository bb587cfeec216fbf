//! Envelope wire format.
//!
//! An envelope is newline-delimited JSON:
//!
//! ```text
//! {"event_id":"…","dsn":"…","sdk":{"name":"…","version":"…"},"sent_at":"…"}
//! {"type":"event","content_type":"application/json"}
//! {…event payload…}
//! ```
//!
//! Every line, including the last, ends with `\n`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{
    auth::CLIENT_NAME,
    dsn::Dsn,
    event::{Event, EventKind},
};

/// Content type of every item body this crate produces.
pub const ITEM_CONTENT_TYPE: &str = "application/json";

/// Errors raised while encoding or parsing an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// A header or payload could not be serialised.
    #[error("failed to serialise envelope: {0}")]
    Serialization(#[source] serde_json::Error),
    /// Parsed input does not follow the envelope layout.
    #[error("malformed envelope: {0}")]
    Malformed(String),
}

/// SDK identity embedded in each envelope header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkMeta {
    pub name: String,
    pub version: String,
}

impl Default for SdkMeta {
    fn default() -> Self {
        Self {
            name: CLIENT_NAME.into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

impl SdkMeta {
    /// `<name>/<version>`, sent as `sentry_client` and `User-Agent`.
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }
}

/// First line of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    pub event_id: String,
    pub dsn: String,
    pub sdk: SdkMeta,
    pub sent_at: String,
}

/// Header line preceding each item body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemHeader {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub content_type: String,
}

/// One item of a parsed envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeItem {
    pub header: ItemHeader,
    pub payload: Value,
}

/// Decoded envelope, used to inspect what a backend received.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub header: EnvelopeHeader,
    pub items: Vec<EnvelopeItem>,
}

/// Format `now` the way `sent_at` expects.
pub fn format_sent_at(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Encode `payload` as a single-item envelope.
///
/// `payload` is serialised verbatim; `event_id` and `kind` only feed the
/// header lines.
///
/// # Errors
///
/// Returns [`EnvelopeError::Serialization`] if `payload` fails to serialise.
pub fn encode<T: Serialize + ?Sized>(
    event_id: &str,
    kind: &EventKind,
    payload: &T,
    dsn: &Dsn,
    sdk: &SdkMeta,
    now: DateTime<Utc>,
) -> Result<Vec<u8>, EnvelopeError> {
    let header = EnvelopeHeader {
        event_id: event_id.to_string(),
        dsn: dsn.to_string(),
        sdk: sdk.clone(),
        sent_at: format_sent_at(now),
    };
    let item = ItemHeader {
        kind: kind.clone(),
        content_type: ITEM_CONTENT_TYPE.into(),
    };

    let mut out = Vec::with_capacity(512);
    write_line(&mut out, &header)?;
    write_line(&mut out, &item)?;
    write_line(&mut out, payload)?;
    Ok(out)
}

/// Encode an [`Event`], reading its id and type from the payload.
pub fn encode_event(
    event: &Event,
    dsn: &Dsn,
    sdk: &SdkMeta,
    now: DateTime<Utc>,
) -> Result<Vec<u8>, EnvelopeError> {
    encode(event.event_id(), &event.kind(), event, dsn, sdk, now)
}

fn write_line<T: Serialize + ?Sized>(out: &mut Vec<u8>, value: &T) -> Result<(), EnvelopeError> {
    serde_json::to_writer(&mut *out, value).map_err(EnvelopeError::Serialization)?;
    out.push(b'\n');
    Ok(())
}

impl Envelope {
    /// Parse envelope bytes produced by [`encode`].
    pub fn from_slice(data: &[u8]) -> Result<Self, EnvelopeError> {
        let text = std::str::from_utf8(data)
            .map_err(|e| EnvelopeError::Malformed(format!("invalid utf-8: {e}")))?;
        let body = text
            .strip_suffix('\n')
            .ok_or_else(|| EnvelopeError::Malformed("missing trailing newline".into()))?;
        let mut lines = body.split('\n');

        let header_line = lines
            .next()
            .ok_or_else(|| EnvelopeError::Malformed("empty envelope".into()))?;
        let header: EnvelopeHeader = parse_line(header_line, "envelope header")?;

        let mut items = Vec::new();
        while let Some(item_line) = lines.next() {
            let item_header: ItemHeader = parse_line(item_line, "item header")?;
            let payload_line = lines
                .next()
                .ok_or_else(|| EnvelopeError::Malformed("item header without payload".into()))?;
            let payload: Value = parse_line(payload_line, "item payload")?;
            items.push(EnvelopeItem {
                header: item_header,
                payload,
            });
        }

        Ok(Self { header, items })
    }
}

fn parse_line<T: for<'de> Deserialize<'de>>(line: &str, what: &str) -> Result<T, EnvelopeError> {
    serde_json::from_str(line).map_err(|e| EnvelopeError::Malformed(format!("{what}: {e}")))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rstest::{fixture, rstest};
    use serde::Serializer;
    use serde_json::json;

    use super::*;

    #[fixture]
    fn dsn() -> Dsn {
        "https://public@sentry.example.com/42".parse().unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap()
    }

    #[rstest]
    fn produces_three_newline_terminated_lines(dsn: Dsn) {
        let event = Event::from_value(json!({"event_id": "abc123", "type": "event"})).unwrap();
        let bytes = encode_event(&event, &dsn, &SdkMeta::default(), now()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.split_terminator('\n').collect();

        assert!(text.ends_with('\n'));
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            format!(
                r#"{{"event_id":"abc123","dsn":"https://public@sentry.example.com/42","sdk":{{"name":"sentry-transport-rs","version":"{}"}},"sent_at":"2024-03-01T12:30:05Z"}}"#,
                env!("CARGO_PKG_VERSION")
            )
        );
        assert_eq!(lines[1], r#"{"type":"event","content_type":"application/json"}"#);
        assert_eq!(lines[2], r#"{"event_id":"abc123","type":"event"}"#);
    }

    #[rstest]
    fn parsed_envelope_recovers_id_and_type(dsn: Dsn) {
        let event = Event::from_value(json!({
            "event_id": "abc123",
            "type": "transaction",
            "spans": [{"op": "db"}],
        }))
        .unwrap();
        let bytes = encode_event(&event, &dsn, &SdkMeta::default(), now()).unwrap();
        let envelope = Envelope::from_slice(&bytes).unwrap();

        assert_eq!(envelope.header.event_id, "abc123");
        assert_eq!(envelope.items.len(), 1);
        assert_eq!(envelope.items[0].header.kind, EventKind::Transaction);
        assert_eq!(envelope.items[0].header.content_type, ITEM_CONTENT_TYPE);
        assert_eq!(envelope.items[0].payload["spans"][0]["op"], "db");
    }

    struct Unserialisable;

    impl Serialize for Unserialisable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("payload refused"))
        }
    }

    #[rstest]
    fn payload_failure_surfaces_as_serialization_error(dsn: Dsn) {
        let err = encode(
            "id",
            &EventKind::Event,
            &Unserialisable,
            &dsn,
            &SdkMeta::default(),
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, EnvelopeError::Serialization(_)));
        assert!(err.to_string().contains("payload refused"));
    }

    #[rstest]
    #[case(b"".as_slice())]
    #[case(b"{}".as_slice())]
    #[case(b"not json\n".as_slice())]
    fn rejects_malformed_input(#[case] data: &[u8]) {
        assert!(matches!(
            Envelope::from_slice(data),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[rstest]
    fn rejects_item_header_without_payload(dsn: Dsn) {
        let event = Event::error();
        let mut bytes = encode_event(&event, &dsn, &SdkMeta::default(), now()).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        let cut = text.split_terminator('\n').take(2).collect::<Vec<_>>().join("\n");
        bytes = format!("{cut}\n").into_bytes();
        assert!(matches!(
            Envelope::from_slice(&bytes),
            Err(EnvelopeError::Malformed(msg)) if msg.contains("without payload")
        ));
    }
}
