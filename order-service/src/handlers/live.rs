use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use std::convert::Infallible;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};

use crate::startup::AppState;

/// Server-sent events for one display channel (`restaurant`,
/// `table-<n>`).
pub async fn stream(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!(channel = %channel, "Live listener connected");

    let events = BroadcastStream::new(state.live.subscribe()).filter_map(move |item| match item {
        Ok(event) if event.channel == channel => Event::default()
            .event(event.event)
            .json_data(&event.payload)
            .ok()
            .map(Ok),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Live listener fell behind, events skipped");
            None
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
