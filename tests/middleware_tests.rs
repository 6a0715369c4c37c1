//! Tests for middleware composition: ordering, transparency, streams, errors.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use pretty_assertions::assert_eq;

use common::{MockModel, ScriptItem};
use tycho::error::TychoError;
use tycho::middleware::{wrap, GenerateFn, Middleware, StreamFn};
use tycho::provider::{GenerateRequest, TextStream};
use tycho::types::*;

/// Appends a suffix to the user tag in params (ordering probe).
struct TagParams(&'static str);

impl Middleware for TagParams {
    fn transform_params(&self, mut request: GenerateRequest) -> GenerateRequest {
        let user = request.settings.user.take().unwrap_or_default();
        request.settings.user = Some(format!("{user}{}", self.0));
        request
    }
}

/// Records wrapper entry/exit order and the response text it observed.
struct Recorder {
    name: &'static str,
    events: Arc<Mutex<Vec<String>>>,
    observed: Arc<Mutex<Vec<String>>>,
}

impl Middleware for Recorder {
    fn wrap_generate(&self, next: Arc<GenerateFn>) -> Arc<GenerateFn> {
        let name = self.name;
        let events = self.events.clone();
        let observed = self.observed.clone();
        Arc::new(move |request| {
            let next = next.clone();
            let events = events.clone();
            let observed = observed.clone();
            Box::pin(async move {
                events.lock().unwrap().push(format!("{name}:enter"));
                let result = next(request).await;
                events.lock().unwrap().push(format!("{name}:exit"));
                if let Ok(ref response) = result {
                    observed.lock().unwrap().push(response.text.clone());
                }
                result
            })
        })
    }
}

/// Appends a suffix to the generate response text.
struct AppendToResponse(&'static str);

impl Middleware for AppendToResponse {
    fn wrap_generate(&self, next: Arc<GenerateFn>) -> Arc<GenerateFn> {
        let suffix = self.0;
        Arc::new(move |request| {
            let next = next.clone();
            Box::pin(async move {
                let mut response = next(request).await?;
                response.text.push_str(suffix);
                Ok(response)
            })
        })
    }
}

/// Uppercases every text delta, forwarding everything else untouched.
struct UppercaseStream;

impl Middleware for UppercaseStream {
    fn wrap_stream(&self, next: Arc<StreamFn>) -> Arc<StreamFn> {
        Arc::new(move |request| {
            let next = next.clone();
            Box::pin(async move {
                let inner = next(request).await?;
                let mapped = async_stream::stream! {
                    let mut inner = std::pin::pin!(inner);
                    while let Some(item) = inner.next().await {
                        match item {
                            Ok(mut delta) => {
                                delta.text = delta.text.to_uppercase();
                                yield Ok(delta);
                            }
                            Err(e) => yield Err(e),
                        }
                    }
                };
                let mapped: TextStream = Box::pin(mapped);
                Ok(mapped)
            })
        })
    }
}

/// Counts deltas passing through without altering them.
struct CountingStream {
    seen: Arc<AtomicUsize>,
}

impl Middleware for CountingStream {
    fn wrap_stream(&self, next: Arc<StreamFn>) -> Arc<StreamFn> {
        let seen = self.seen.clone();
        Arc::new(move |request| {
            let next = next.clone();
            let seen = seen.clone();
            Box::pin(async move {
                let inner = next(request).await?;
                let counted = async_stream::stream! {
                    let mut inner = std::pin::pin!(inner);
                    while let Some(item) = inner.next().await {
                        if item.is_ok() {
                            seen.fetch_add(1, Ordering::SeqCst);
                        }
                        yield item;
                    }
                };
                let counted: TextStream = Box::pin(counted);
                Ok(counted)
            })
        })
    }
}

#[tokio::test]
async fn empty_chain_is_observably_identical() {
    let bare = Arc::new(MockModel::new("m"));
    bare.queue_response("hello");
    let wrapped = wrap(bare.clone(), vec![]);

    let request = GenerateRequest::new(vec![ModelMessage::user("hi")]);
    let response = wrapped.generate(&request).await.unwrap();
    assert_eq!(response.text, "hello");

    let deltas: Vec<_> = wrapped
        .stream(&request)
        .await
        .unwrap()
        .collect::<Vec<_>>()
        .await;
    assert_eq!(deltas.len(), 3);
    assert!(deltas.iter().all(|d| d.is_ok()));
}

#[tokio::test]
async fn empty_chain_propagates_same_error() {
    let bare = Arc::new(MockModel::new("m"));
    bare.fail_generate("boom");
    let wrapped = wrap(bare, vec![]);

    let err = wrapped
        .generate(&GenerateRequest::new(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, TychoError::Api { status: 500, ref message } if message == "boom"));
}

#[tokio::test]
async fn transform_params_applies_in_list_order() {
    let model = Arc::new(MockModel::new("m"));
    let wrapped = wrap(
        model.clone(),
        vec![Arc::new(TagParams("-a")), Arc::new(TagParams("-b"))],
    );

    wrapped
        .generate(&GenerateRequest::new(vec![]))
        .await
        .unwrap();

    // The model must see B(A(original)).
    let seen = model.last_request().unwrap();
    assert_eq!(seen.settings.user.as_deref(), Some("-a-b"));
}

#[tokio::test]
async fn first_stage_is_outermost_wrapper() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let observed_a = Arc::new(Mutex::new(Vec::new()));
    let observed_b = Arc::new(Mutex::new(Vec::new()));

    let model = Arc::new(MockModel::new("m"));
    model.queue_response("x");

    let wrapped = wrap(
        model,
        vec![
            Arc::new(Recorder {
                name: "A",
                events: events.clone(),
                observed: observed_a.clone(),
            }),
            Arc::new(Recorder {
                name: "B",
                events: events.clone(),
                observed: observed_b.clone(),
            }),
        ],
    );

    wrapped
        .generate(&GenerateRequest::new(vec![]))
        .await
        .unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["A:enter", "B:enter", "B:exit", "A:exit"]
    );
}

#[tokio::test]
async fn outer_stage_observes_inner_stage_result() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let observed = Arc::new(Mutex::new(Vec::new()));

    let model = Arc::new(MockModel::new("m"));
    model.queue_response("x");

    // A (outer, recording) must see the text after B (inner) appended to it.
    let wrapped = wrap(
        model,
        vec![
            Arc::new(Recorder {
                name: "A",
                events,
                observed: observed.clone(),
            }),
            Arc::new(AppendToResponse("-b")),
        ],
    );

    let response = wrapped
        .generate(&GenerateRequest::new(vec![]))
        .await
        .unwrap();
    assert_eq!(response.text, "x-b");
    assert_eq!(*observed.lock().unwrap(), vec!["x-b"]);
}

#[tokio::test]
async fn uppercase_stream_stage_preserves_shape() {
    let model = Arc::new(MockModel::new("m"));
    model.set_script(vec![
        ScriptItem::text("a"),
        ScriptItem::text("b"),
        ScriptItem::done(),
    ]);

    let wrapped = wrap(model, vec![Arc::new(UppercaseStream)]);

    let deltas: Vec<TextStreamDelta> = wrapped
        .stream(&GenerateRequest::new(vec![]))
        .await
        .unwrap()
        .map(|d| d.unwrap())
        .collect()
        .await;

    let texts: Vec<&str> = deltas
        .iter()
        .filter(|d| d.event_type == StreamEventType::TextDelta)
        .map(|d| d.text.as_str())
        .collect();
    assert_eq!(texts, vec!["A", "B"]);

    // Exactly one terminal delta, in final position.
    let done_count = deltas.iter().filter(|d| d.is_done()).count();
    assert_eq!(done_count, 1);
    assert!(deltas.last().unwrap().is_done());
    assert_eq!(deltas.len(), 3);
}

#[tokio::test]
async fn dropping_stream_stops_delivery() {
    let seen = Arc::new(AtomicUsize::new(0));
    let model = Arc::new(MockModel::new("m"));
    model.set_script(vec![
        ScriptItem::text("a"),
        ScriptItem::text("b"),
        ScriptItem::text("c"),
        ScriptItem::done(),
    ]);

    let wrapped = wrap(model, vec![Arc::new(CountingStream { seen: seen.clone() })]);

    {
        let mut stream = wrapped.stream(&GenerateRequest::new(vec![])).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.text, "a");
        // Drop mid-stream: cancellation point.
    }

    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn generate_error_passes_through_non_catching_chain() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let model = Arc::new(MockModel::new("m"));
    model.fail_generate("provider down");

    let wrapped = wrap(
        model,
        vec![
            Arc::new(Recorder {
                name: "A",
                events: events.clone(),
                observed: Arc::new(Mutex::new(Vec::new())),
            }),
            Arc::new(AppendToResponse("-b")),
        ],
    );

    let err = wrapped
        .generate(&GenerateRequest::new(vec![]))
        .await
        .unwrap_err();
    assert!(
        matches!(err, TychoError::Api { status: 500, ref message } if message == "provider down")
    );
    // The outer stage still ran around the failure.
    assert_eq!(*events.lock().unwrap(), vec!["A:enter", "A:exit"]);
}

#[tokio::test]
async fn mid_stream_error_propagates_after_partial_output() {
    let model = Arc::new(MockModel::new("m"));
    model.set_script(vec![
        ScriptItem::text("partial"),
        ScriptItem::Error("connection reset".into()),
    ]);

    let wrapped = wrap(model, vec![Arc::new(UppercaseStream)]);

    let items: Vec<_> = wrapped
        .stream(&GenerateRequest::new(vec![]))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap().text, "PARTIAL");
    assert!(
        matches!(items[1], Err(TychoError::Stream(ref m)) if m == "connection reset")
    );
}

#[tokio::test]
async fn wrapped_handle_keeps_model_identity() {
    let model = Arc::new(MockModel::new("claude-x"));
    let wrapped = wrap(model, vec![Arc::new(TagParams("-a"))]);
    assert_eq!(wrapped.provider_name(), "mock");
    assert_eq!(wrapped.model_id(), "claude-x");
}
