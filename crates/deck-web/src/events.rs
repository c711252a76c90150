//! Server-sent event stream of gateway status and output.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;

use deck_panel::PanelController;

/// `GET /api/events`: one SSE event per `PanelEvent`, named after it
/// (`gateway-status`, `gateway-log`). Slow clients get a `lagged` event
/// with the number of events they missed. The stream ends when the panel
/// shuts down.
pub async fn stream(
    State(panel): State<Arc<PanelController>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = panel.subscribe_events();
    let closing = panel.closing();

    let stream = async_stream::stream! {
        tokio::pin!(closing);
        loop {
            let received = tokio::select! {
                _ = &mut closing => break,
                received = rx.recv() => received,
            };
            match received {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(Event::default().event(event.name()).data(json));
                    }
                }
                Err(RecvError::Lagged(count)) => {
                    tracing::debug!(count, "SSE client lagged");
                    yield Ok(Event::default()
                        .event("lagged")
                        .data(format!("{{\"skipped\":{count}}}")));
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
