//! Wire codec for the positional-array request envelope and the streamed
//! response frames.
//!
//! The request side builds a fixed-shape 95-slot array whose slots are
//! mostly constants owned by [`WireConfig`](crate::config::WireConfig).
//! The response side decodes one newline-delimited frame at a time; every
//! frame either descends to a full-so-far text plus continuation ids, or
//! is framing noise and decodes to `None`. Decoding is a format, not a
//! protocol negotiator: it never validates the remote schema beyond the
//! shape it needs.

use chrono::Utc;
use serde_json::{json, Value};
use shared::ContinuationIds;
use uuid::Uuid;

use crate::config::WireConfig;

/// Marker identifying a response frame that carries chat data. Lines
/// without it are heartbeats or length prefixes.
const ENVELOPE_MARKER: &str = "wrb.fr";

/// Fixed sub-second component the web client stamps into slot 66.
const TIMESTAMP_MICROS: u64 = 287_000_000;

/// Remote reference to an uploaded image, as used inside a turn payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    pub name: String,
}

/// One successfully decoded response frame. `text` is the full response
/// so far, not a delta; a later frame supersedes an earlier one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLine {
    pub text: String,
    /// Present only when the frame carried all three continuation ids; a
    /// partial triple is treated as absent.
    pub ids: Option<ContinuationIds>,
}

/// Build the `f.req` form value for one turn: the outer two-element array
/// whose second element is the JSON-encoded positional envelope.
pub fn encode_envelope(
    prompt: &str,
    ids: &ContinuationIds,
    image: Option<&ImageRef>,
    config: &WireConfig,
) -> String {
    let mut slots = vec![Value::Null; 95];

    // Slot 0: user input, with the nested [[[url, kind], filename]]
    // structure when an image rides along. The only data-dependent branch.
    let image_list = match image {
        Some(img) => json!([[[img.url, 1], img.name]]),
        None => Value::Null,
    };
    slots[0] = json!([prompt, 0, null, image_list, null, null, 0]);

    slots[1] = json!([config.language]);

    // Slot 2: continuation ids, empty strings on a fresh conversation.
    slots[2] = json!([
        ids.conversation_id,
        ids.response_id,
        ids.choice_id,
        null,
        null,
        [],
        null,
        null,
        null,
        ""
    ]);

    slots[3] = json!(config.routing_blob);
    slots[4] = json!(config.client_variant);

    // Constant feature flags the web client always sends.
    slots[6] = json!([0]);
    slots[7] = json!(1);
    slots[10] = json!(1);
    slots[11] = json!(0);
    slots[17] = json!([[0]]);
    slots[18] = json!(0);
    slots[27] = json!(1);
    slots[30] = json!([4]);
    slots[41] = json!([2]);
    slots[53] = json!(0);

    slots[59] = json!(correlation_id());
    slots[61] = json!([]);
    slots[66] = json!([Utc::now().timestamp(), TIMESTAMP_MICROS]);
    slots[94] = json!([]);

    let envelope = Value::Array(slots).to_string();
    json!([null, envelope]).to_string()
}

/// Freshly generated random correlation identifier, uppercased the way
/// the web client emits it.
fn correlation_id() -> String {
    Uuid::new_v4().to_string().to_uppercase()
}

/// Decode one newline-delimited chunk of the stream.
///
/// Returns `None` for anything that is not a complete, well-formed chat
/// frame. Framing lines, heartbeats, and partially transmitted JSON are
/// all expected during streaming and must not abort the stream.
pub fn decode_line(line: &str) -> Option<DecodedLine> {
    if !line.contains(ENVELOPE_MARKER) {
        return None;
    }

    let outer: Value = serde_json::from_str(line).ok()?;
    let frame = outer.as_array()?.first()?.as_array()?;
    if frame.first()?.as_str()? != ENVELOPE_MARKER {
        return None;
    }

    // The chat payload is a second JSON document embedded as a string at
    // a fixed offset inside the frame.
    let payload: Value = serde_json::from_str(frame.get(2)?.as_str()?).ok()?;
    if !payload.is_array() {
        return None;
    }

    let candidate = payload.get(4)?.as_array()?.first()?;
    let text = candidate.get(1)?.as_array()?.first()?.as_str()?.to_string();

    // All three ids or none: a frame missing any of them leaves the
    // caller's previous triple in force.
    let ids = (|| {
        let conversation = payload.get(1)?.as_array()?;
        Some(ContinuationIds::new(
            conversation.first()?.as_str()?,
            conversation.get(1)?.as_str()?,
            candidate.as_array()?.first()?.as_str()?,
        ))
    })();

    Some(DecodedLine { text, ids })
}
