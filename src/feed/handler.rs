//! Incoming stream frame parsing.

use serde::Deserialize;
use tracing::debug;

use crate::Result;
use crate::error::CandlekeepError;
use crate::models::KlineTick;
use crate::models::kline::{KlineEvent, StreamFrame};

/// Just enough of a payload to route it.
#[derive(Deserialize)]
struct EventHeader {
    #[serde(rename = "e")]
    event_type: Option<String>,
}

/// Parses one text frame from the combined stream.
///
/// Returns `Ok(None)` for frames that are not kline events (subscription
/// acknowledgements, other event types).
///
/// # Errors
///
/// Returns [`CandlekeepError::MalformedMessage`] if the frame is not JSON
/// or a kline event is missing fields.
pub fn parse_frame(text: &str) -> Result<Option<KlineTick>> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| CandlekeepError::MalformedMessage(e.to_string()))?;

    let Some(data) = value.get("data") else {
        debug!("Skipping frame without data envelope");
        return Ok(None);
    };
    let header = EventHeader::deserialize(data)
        .map_err(|e| CandlekeepError::MalformedMessage(e.to_string()))?;
    if header.event_type.as_deref() != Some("kline") {
        debug!(event_type = ?header.event_type, "Skipping non-kline event");
        return Ok(None);
    }

    let frame: StreamFrame<KlineEvent> =
        serde_json::from_value(value).map_err(|e| CandlekeepError::MalformedMessage(e.to_string()))?;
    Ok(Some(frame.data.into_tick()))
}
