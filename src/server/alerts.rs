//! SSE (Server-Sent Events) streaming of health alerts.
//!
//! Converts the engine's broadcast channel of alerts into an SSE stream.
//! Slow consumers that fall behind the channel's buffer miss alerts rather
//! than stalling the engine; a lag marker event tells them how many.

use axum::response::sse::Event;
use futures::stream::Stream;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::health::monitor::Alert;

#[derive(Debug, Serialize)]
struct LagMarker {
    missed: u64,
}

/// Convert an alert receiver into an SSE stream.
pub fn alerts_to_sse_stream(
    rx: broadcast::Receiver<Alert>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    BroadcastStream::new(rx).map(|item| {
        let event = match item {
            Ok(alert) => {
                let data = serde_json::to_string(&alert).unwrap_or_default();
                Event::default().event("alert").data(data)
            }
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                let data = serde_json::to_string(&LagMarker { missed }).unwrap_or_default();
                Event::default().event("lagged").data(data)
            }
        };
        Ok(event)
    })
}
