//! HTTP endpoint for triggering a review session.
//!
//! `POST /review` takes a [`ReviewRequest`] JSON payload and responds with
//! a Server-Sent-Events stream: one pipeline event per `data:` line. The
//! kernel runs as a detached task owned by the stream; when the client
//! disconnects the stream is dropped and the task is aborted, which
//! cancels every stage at its next suspension point.

use axum::Json;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use review_kernel::{EventSender, PipelineEvent, ReviewRequest, run_review};

/// Aborts the kernel task when the SSE stream is dropped.
struct SessionGuard(JoinHandle<()>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[instrument(name = "review_route", skip(body), fields(mode = ?body.diff_mode))]
pub async fn review_route(
    Json(body): Json<ReviewRequest>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (events, rx) = EventSender::new();

    info!(prompt_len = body.prompt.len(), "review session requested");
    let task_events = events.clone();
    let handle = tokio::spawn(async move {
        // Over HTTP there is no interactive approver: pending tools are
        // denied unless `auto_approve` whitelists them.
        if let Err(err) = run_review(body, task_events.clone(), None).await {
            warn!(%err, "review session failed");
            task_events.error(None, &err.to_string());
        }
    });

    Sse::new(event_stream(rx, SessionGuard(handle))).keep_alive(KeepAlive::default())
}

fn event_stream(
    rx: UnboundedReceiver<PipelineEvent>,
    guard: SessionGuard,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    futures::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        let sse = match serde_json::to_string(&event) {
            Ok(json) => Event::default().data(json),
            Err(_) => Event::default().data("{}"),
        };
        Some((Ok(sse), (rx, guard)))
    })
}
