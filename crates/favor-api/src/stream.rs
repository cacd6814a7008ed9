//! `GET /api/stream`: bus events as server-sent events
//!
//! `?restrict=a,b` limits the stream to the listed event types.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use favor_event_bus::RawEvent;
use futures::stream::{self, Stream};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamQuery {
    restrict: Option<String>,
}

impl StreamQuery {
    fn event_types(&self) -> Vec<String> {
        self.restrict
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub(crate) async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let wanted = query.event_types();
    let rx = state.event_bus.subscribe_all();
    debug!(?wanted, "Event stream opened");

    let events = stream::unfold((rx, wanted), |(mut rx, wanted)| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let listed = wanted.is_empty()
                        || wanted.iter().any(|t| t == event.event_type.as_str());
                    if let Some(sse) = listed.then(|| to_sse(&event)).flatten() {
                        return Some((Ok(sse), (rx, wanted)));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream client fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn to_sse(event: &RawEvent) -> Option<SseEvent> {
    SseEvent::default()
        .event(event.event_type.as_str())
        .json_data(event)
        .map_err(|e| warn!(event_type = %event.event_type, error = %e, "Cannot encode event"))
        .ok()
}

#[cfg(test)]
mod tests {
    use crate::create_router;
    use crate::tests::create_test_app;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use favor_core::events::{FavorExpUpdatedData, FAVOR_EXP_UPDATED};
    use favor_core::{Context, Event};
    use futures::StreamExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    #[test]
    fn test_restrict_parsing() {
        let query = super::StreamQuery {
            restrict: Some("state_changed, ,bafavorank_exp_updated".to_string()),
        };
        assert_eq!(
            query.event_types(),
            vec!["state_changed", "bafavorank_exp_updated"]
        );
        assert!(super::StreamQuery::default().event_types().is_empty());
    }

    #[tokio::test]
    async fn test_stream_forwards_restricted_events() {
        let app = create_test_app().await;
        let request = Request::builder()
            .uri(format!("/api/stream?restrict={FAVOR_EXP_UPDATED}"))
            .body(Body::empty())
            .unwrap();

        let response = create_router(app.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        let mut body = response.into_body().into_data_stream();

        let bus = &app.state.event_bus;
        bus.fire(Event::new("state_changed", json!({}), Context::new()));
        bus.fire_typed(
            FavorExpUpdatedData {
                entry_id: "01ENTRY".to_string(),
                student_id: 10000,
                old_exp: Some(1000),
                new_exp: 1132,
            },
            Context::new(),
        );

        let frame = body.next().await.unwrap().unwrap();
        let text = String::from_utf8(frame.to_vec()).unwrap();
        assert!(text.starts_with(&format!("event: {FAVOR_EXP_UPDATED}\n")));

        let data = text
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .unwrap();
        let event: Value = serde_json::from_str(data).unwrap();
        assert_eq!(event["event_type"], FAVOR_EXP_UPDATED);
        assert_eq!(event["data"]["old_exp"], 1000);
        assert_eq!(event["data"]["new_exp"], 1132);
    }
}
