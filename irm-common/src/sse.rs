//! Server-Sent Events (SSE) utilities
//!
//! Turns a run's event receiver into an axum SSE response.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::events::{EventReceiver, MemoEvent};

/// Keep-alive interval for idle streams
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Convert a memo event into an SSE frame
///
/// Returns `None` if the payload cannot be serialized.
pub fn to_sse_event(event: &MemoEvent) -> Option<Event> {
    match Event::default().event(event.event_type()).json_data(event) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(event_type = event.event_type(), "Failed to serialize SSE event: {}", e);
            None
        }
    }
}

/// Stream a run's events to an SSE client
///
/// The stream ends when the producer drops its sender. Dropping the
/// response (client disconnect) drops the receiver, which producers observe
/// through `EventSender::emit`.
///
/// # Arguments
/// * `rx` - Receiving half of the run's event channel
/// * `scope` - Label for logging (e.g. "generate", "regenerate")
pub fn event_stream_response(
    rx: EventReceiver,
    scope: &'static str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to {} stream", scope);

    let events = rx.into_stream();
    let stream = async_stream::stream! {
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            debug!(scope, event_type = event.event_type(), "SSE: sending event");
            if let Some(frame) = to_sse_event(&event) {
                yield Ok(frame);
            }
        }
        info!("SSE: {} stream finished", scope);
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
