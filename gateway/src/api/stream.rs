use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use std::sync::Arc;

use super::AppState;

/// GET /api/stream - Server-sent events, one `stats-update` per tick.
/// The subscription is released when the client disconnects and the
/// response stream is dropped.
pub async fn stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = state
        .gateway
        .subscribe()
        .map(|event| Event::default().event(event.name).json_data(&event.data));

    Sse::new(events).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::super::{create_router, AppState};
    use crate::config::GatewayConfig;
    use crate::services::{BroadcastEvent, Gateway};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_stream_delivers_published_events() {
        let gateway = Arc::new(Gateway::new(GatewayConfig::default()).unwrap());
        let router = create_router(Arc::new(AppState {
            gateway: gateway.clone(),
        }));

        let response = router
            .oneshot(Request::get("/api/stream").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );
        assert_eq!(gateway.hub().subscriber_count(), 1);

        gateway
            .hub()
            .publish(&BroadcastEvent::new("stats-update", json!({"totalNodes": 5})));

        let mut body = response.into_body().into_data_stream();
        let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.contains("event: stats-update"));
        assert!(text.contains(r#"data: {"totalNodes":5}"#));

        drop(body);
        assert_eq!(gateway.hub().subscriber_count(), 0);
    }
}
