//! `GET /api/events` (spec §6): the event bus fanned out over SSE. Each
//! connection gets its own bounded subscription (spec §4.7); a 15 s
//! keepalive (spec §4.10) is generated per-connection here rather than on
//! a shared scheduler task, since the `dropped` count it reports is only
//! meaningful per subscriber.

use std::{convert::Infallible, time::Duration};

use axum::{
  extract::State,
  response::sse::{Event as SseEvent, Sse},
};
use futures_util::stream::{Stream, unfold};

use crate::eventbus::{Event, Subscriber};

use super::AppState;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

struct StreamState {
  subscriber: Subscriber,
  ticker: tokio::time::Interval,
}

pub async fn events_stream(
  State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
  let subscriber = state.ctx.events.subscribe().await;
  let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
  ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
  // The first tick fires immediately; skip it so the client isn't sent a
  // keepalive before any real event had a chance to arrive.
  ticker.reset();

  let initial = StreamState { subscriber, ticker };
  let stream = unfold(Some(initial), |state| async move {
    let mut state = state?;
    let event = tokio::select! {
      received = state.subscriber.recv() => {
        received?
      }
      _ = state.ticker.tick() => {
        Event::keepalive(state.subscriber.dropped_count())
      }
    };
    let sse_event = to_sse_event(&event);
    Some((Ok(sse_event), Some(state)))
  });

  Sse::new(stream)
}

fn to_sse_event(event: &Event) -> SseEvent {
  SseEvent::default()
    .event(event.kind())
    .json_data(event)
    .unwrap_or_else(|_| SseEvent::default().event(event.kind()))
}
