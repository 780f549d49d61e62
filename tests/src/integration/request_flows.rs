//! # Request Flows
//!
//! `RequestTracker` lifecycles observed through binders and event streams.

#[cfg(test)]
mod tests {
    use hooks_bus::{
        AbortHandle, BusScope, Capabilities, EventBus, EventStream, Metadata, Primitive,
        RequestOutcome, RequestSignal, RequestTracker, CLEANUP, REQUEST_ABORTED, REQUEST_ENDED,
        REQUEST_EVENTS, REQUEST_STARTED,
    };
    use hooks_state::{BinderError, CountOptions, DerivedState, PromiseBinder, Record};
    use serde_json::{json, Value};
    use tokio::sync::oneshot;

    fn meta(url: &str) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("url".to_string(), Primitive::from(url));
        metadata
    }

    fn in_flight(scope: &BusScope) -> DerivedState<i64> {
        DerivedState::bind(
            scope,
            "spinner",
            [REQUEST_STARTED, REQUEST_ENDED, REQUEST_ABORTED],
            0i64,
            |prev, _, event| match event {
                REQUEST_STARTED => Ok(prev + 1),
                _ => Ok(prev - 1),
            },
        )
        .unwrap()
    }

    async fn wait_for(counter: &DerivedState<i64>, value: i64) {
        while counter.state() != value {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_spinner_follows_request_lifecycle() {
        let scope = BusScope::new();
        let spinner = in_flight(&scope);
        let tracker = RequestTracker::bind(&scope, "api").unwrap();
        let (respond, response) = oneshot::channel::<Value>();

        let request = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.track(meta("/todos"), None, response).await })
        };

        wait_for(&spinner, 1).await;
        respond.send(json!([{"id": 1}])).unwrap();
        let outcome = request.await.unwrap();

        assert_eq!(outcome, RequestOutcome::Succeeded(json!([{"id": 1}])));
        assert_eq!(spinner.state(), 0);
        // Fired count is per handler; nothing listens to `cleanup`.
        assert_eq!(tracker.bus().stats().events_fired_count, 2);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_spinner() {
        let scope = BusScope::new();
        let spinner = in_flight(&scope);
        let tracker = RequestTracker::bind(&scope, "api").unwrap();
        let (first_tx, first_rx) = oneshot::channel::<Value>();
        let (second_tx, second_rx) = oneshot::channel::<Value>();

        let first = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.track(meta("/a"), None, first_rx).await })
        };
        let second = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.track(meta("/b"), None, second_rx).await })
        };

        wait_for(&spinner, 2).await;
        first_tx.send(Value::Null).unwrap();
        first.await.unwrap();
        assert_eq!(spinner.state(), 1);

        second_tx.send(Value::Null).unwrap();
        second.await.unwrap();
        assert_eq!(spinner.state(), 0);
    }

    #[tokio::test]
    async fn test_abort_signals_aborted_not_ended() {
        let scope = BusScope::new();
        let spinner = in_flight(&scope);
        let tracker = RequestTracker::bind(&scope, "api").unwrap();
        let listener =
            EventBus::bind(&scope, "listener", Capabilities::new().subscribes(REQUEST_EVENTS))
                .unwrap();
        let mut aborted = EventStream::open(&listener, REQUEST_ABORTED).unwrap();
        let mut ended = EventStream::open(&listener, REQUEST_ENDED).unwrap();
        let abort = AbortHandle::new();

        let request = {
            let tracker = tracker.clone();
            let abort = abort.clone();
            tokio::spawn(async move {
                let never = std::future::pending::<Result<Value, String>>();
                tracker.track(meta("/slow"), Some(&abort), never).await
            })
        };

        wait_for(&spinner, 1).await;
        abort.abort();

        assert_eq!(request.await.unwrap(), RequestOutcome::Aborted);
        assert_eq!(spinner.state(), 0);

        let payload = aborted.recv().await.unwrap();
        let signal = RequestSignal::from_payload(&payload).unwrap();
        assert_eq!(signal, RequestSignal::pending(meta("/slow")));
        assert_eq!(ended.try_recv(), Ok(None));
    }

    #[tokio::test]
    async fn test_failure_is_normalized_for_composite_state() {
        let scope = BusScope::new();
        let view = DerivedState::composite(
            &scope,
            "todos",
            [REQUEST_ENDED],
            Record::new(),
            |_, payload, _| {
                let signal = RequestSignal::from_payload(payload)
                    .ok_or_else(|| BinderError::Payload("not a request signal".to_string()))?;
                let mut partial = Record::new();
                partial.insert("data".to_string(), signal.success.unwrap_or(Value::Null));
                partial.insert("error".to_string(), json!(signal.error));
                Ok(partial)
            },
        )
        .unwrap();
        let tracker = RequestTracker::bind(&scope, "api").unwrap();

        let outcome = tracker
            .track(meta("/todos"), None, async {
                Err::<Value, _>("500 Internal Server Error")
            })
            .await;

        assert_eq!(
            outcome,
            RequestOutcome::Failed("500 Internal Server Error".to_string())
        );
        assert_eq!(view.field("data"), Some(Value::Null));
        assert_eq!(view.field("error"), Some(json!("500 Internal Server Error")));
    }

    #[tokio::test]
    async fn test_promise_binder_reports_failed_requests() {
        let scope = BusScope::new();
        let cleanups =
            DerivedState::count(&scope, "cleanups", [CLEANUP], CountOptions::default(), |n, _| {
                Ok(n + 1)
            })
            .unwrap();
        let tracker = RequestTracker::bind(&scope, "api").unwrap();
        let saver = PromiseBinder::bind(&scope, "saver", ["save"], move |payload, _| {
            let tracker = tracker.clone();
            async move {
                let accepted = payload["valid"] == json!(true);
                let request = async move {
                    if accepted {
                        Ok(payload)
                    } else {
                        Err("validation failed")
                    }
                };
                match tracker.track(meta("/save"), None, request).await {
                    RequestOutcome::Failed(message) => Err(BinderError::reducer(message)),
                    RequestOutcome::Succeeded(_) | RequestOutcome::Aborted => Ok(()),
                }
            }
        })
        .unwrap();
        let save = saver.trigger("save", |args| args);

        save.fire(json!({"valid": false}));
        saver.settled().await;
        assert_eq!(
            saver.error(),
            Some(BinderError::Reducer("validation failed".to_string()))
        );

        save.fire(json!({"valid": true}));
        saver.settled().await;
        assert!(saver.error().is_none());
        assert_eq!(cleanups.state(), 2);
    }

    #[tokio::test]
    async fn test_teardown_mid_request_still_settles() {
        let scope = BusScope::new();
        let spinner = in_flight(&scope);
        let tracker = RequestTracker::bind(&scope, "api").unwrap();
        let (respond, response) = oneshot::channel::<Value>();

        let request = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.track(meta("/late"), None, response).await })
        };

        wait_for(&spinner, 1).await;
        scope.teardown();
        respond.send(json!("done")).unwrap();

        assert_eq!(
            request.await.unwrap(),
            RequestOutcome::Succeeded(json!("done"))
        );
        // Nothing was delivered after the scope closed.
        assert_eq!(spinner.state(), 1);
    }

    #[tokio::test]
    async fn test_dropped_stream_leaves_spinner_subscribed() {
        let scope = BusScope::new();
        let spinner = in_flight(&scope);
        let tracker = RequestTracker::bind(&scope, "api").unwrap();
        let listener =
            EventBus::bind(&scope, "listener", Capabilities::new().subscribes(REQUEST_EVENTS))
                .unwrap();

        drop(EventStream::open(&listener, REQUEST_ABORTED).unwrap());
        assert_eq!(scope.handler_count(REQUEST_STARTED), 1);
        assert_eq!(scope.handler_count(REQUEST_ENDED), 1);

        let outcome = tracker
            .track(meta("/after-drop"), None, async { Ok::<_, String>(Value::Null) })
            .await;

        assert_eq!(outcome, RequestOutcome::Succeeded(Value::Null));
        assert!(spinner.is_bound());
        // started then ended both reached the spinner.
        assert_eq!(spinner.stats().events_subscribed_count, 3);
        assert_eq!(tracker.bus().stats().events_fired_count, 2);
        assert_eq!(spinner.state(), 0);
    }
}
