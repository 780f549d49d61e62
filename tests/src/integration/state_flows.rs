//! # State Flows
//!
//! Binders, the shared state box and the route monitor living on one
//! scope, driven by external emitters and by each other.

#[cfg(test)]
mod tests {
    use hooks_bus::{BusScope, Capabilities, EventBus, Handler, HandlerError};
    use hooks_state::{
        decode, BinderError, CountOptions, DebounceConfig, DebouncedQuery, DerivedState, Dispatch,
        Encryptor, History, MemoryHistory, MemoryStorage, Record, RemoteSource, RouteMonitor,
        SharedStateBox, SharedStateOptions, StorageAccessor, StorageDriver, StorageError,
        TextFilter, ROUTE_CHANGED,
    };
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => Record::new(),
        }
    }

    fn add(prev: i64, payload: &Value) -> Result<i64, BinderError> {
        Ok(prev + decode::<i64>(payload)?)
    }

    /// XORs every byte of the JSON text with a fixed key and hex-encodes it.
    struct XorCipher(u8);

    impl Encryptor for XorCipher {
        fn encrypt(&self, value: &Value) -> Result<String, StorageError> {
            Ok(value
                .to_string()
                .bytes()
                .map(|b| format!("{:02x}", b ^ self.0))
                .collect())
        }

        fn decrypt(&self, stored: &str) -> Result<Value, StorageError> {
            let bytes = (0..stored.len())
                .step_by(2)
                .map(|i| {
                    stored
                        .get(i..i + 2)
                        .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                        .map(|b| b ^ self.0)
                        .ok_or_else(|| StorageError::Encryption("bad hex".to_string()))
                })
                .collect::<Result<Vec<u8>, _>>()?;
            serde_json::from_slice(&bytes).map_err(|e| StorageError::Encryption(e.to_string()))
        }
    }

    // =============================================================================
    // BINDERS DRIVEN BY EXTERNAL EMITTERS
    // =============================================================================

    #[test]
    fn test_list_binder_doubles_external_payload() {
        let scope = BusScope::new();
        let list = DerivedState::list(&scope, "doubles", ["push"], vec![2i64], |prev, payload| {
            let n: i64 = decode(payload)?;
            Ok(prev.iter().copied().chain([n * 2]).collect())
        })
        .unwrap();
        let form = EventBus::bind(&scope, "form", Capabilities::new().fires(["push"])).unwrap();

        form.emit("push", json!(2)).unwrap();
        form.emit("push", json!(5)).unwrap();

        assert_eq!(list.state(), vec![2, 4, 10]);
        assert_eq!(form.stats().events_fired_count, 2);
        assert_eq!(list.stats().events_subscribed_count, 1);
    }

    #[test]
    fn test_count_binder_from_other_component() {
        let scope = BusScope::new();
        let counter =
            DerivedState::count(&scope, "counter", ["inc"], CountOptions::starting_at(2), add)
                .unwrap();
        let button = EventBus::bind(&scope, "button", Capabilities::new().fires(["inc"])).unwrap();

        button.emit("inc", json!(1)).unwrap();

        assert_eq!(counter.state(), 3);
        assert_eq!(button.stats().events_fired_count, 1);
        // The binder's own stats only count its own emits.
        assert_eq!(counter.stats().events_fired_count, 0);
    }

    #[test]
    fn test_composite_binder_merges_notification() {
        let scope = BusScope::new();
        let inbox = DerivedState::composite(
            &scope,
            "inbox",
            ["notify"],
            record(json!({"notifications": [], "read": 0, "unread": 0})),
            |_, _, _| Ok(record(json!({"notifications": ["hello world"]}))),
        )
        .unwrap();

        inbox.trigger_raw("notify").fire(json!(null));

        assert_eq!(
            Value::Object(inbox.state()),
            json!({"notifications": ["hello world"], "read": 0, "unread": 0})
        );
    }

    #[test]
    fn test_one_trigger_updates_every_binder() {
        let scope = BusScope::new();
        let total = DerivedState::count(&scope, "total", ["cart:add"], CountOptions::default(), add)
            .unwrap();
        let items = DerivedState::list(&scope, "items", ["cart:add"], Vec::new(), |prev, payload| {
            let mut next = prev.to_vec();
            next.push(decode::<i64>(payload)?);
            Ok(next)
        })
        .unwrap();

        let results = total.trigger_raw("cart:add").fire(json!(5));
        items.trigger_raw("cart:add").fire(json!(3));

        assert_eq!(results.len(), 2);
        assert_eq!(total.state(), 8);
        assert_eq!(items.state(), vec![5, 3]);
    }

    #[test]
    fn test_reducer_error_does_not_disturb_other_binders() {
        let scope = BusScope::new();
        let strict = DerivedState::count(&scope, "strict", ["set"], CountOptions::default(), add)
            .unwrap();
        let lenient = DerivedState::bind(&scope, "lenient", ["set"], Value::Null, |_, p, _| {
            Ok(p.clone())
        })
        .unwrap();
        let emitter =
            EventBus::bind(&scope, "emitter", Capabilities::new().fires(["set"])).unwrap();

        emitter.emit("set", json!("abc")).unwrap();

        assert_eq!(strict.state(), 0);
        assert!(matches!(strict.error(), Some(BinderError::Payload(_))));
        assert_eq!(lenient.state(), json!("abc"));
        assert!(lenient.error().is_none());
    }

    #[test]
    fn test_foreign_handler_failure_lands_in_error_slot() {
        let scope = BusScope::new();
        let counter = DerivedState::count(&scope, "counter", ["inc"], CountOptions::default(), add)
            .unwrap();
        let guard = EventBus::bind(&scope, "guard", Capabilities::new()).unwrap();
        guard.on("inc", &Handler::new(|_, _| Err(HandlerError::new("locked"))));

        let results = counter.trigger_raw("inc").fire(json!(1));

        // The binder's reducer ran first; the failing guard aborted the rest.
        assert!(results.is_empty());
        assert_eq!(counter.state(), 1);
        assert!(matches!(counter.error(), Some(BinderError::Handler { .. })));
    }

    #[test]
    fn test_unmounted_binder_leaves_registry_clean() {
        let scope = BusScope::new();
        let keep = DerivedState::count(&scope, "keep", ["inc"], CountOptions::default(), add)
            .unwrap();
        {
            let _temporary =
                DerivedState::count(&scope, "temporary", ["inc"], CountOptions::default(), add)
                    .unwrap();
            assert_eq!(scope.handler_count("inc"), 2);
        }
        assert_eq!(scope.handler_count("inc"), 1);

        keep.trigger_raw("inc").fire(json!(4));
        assert_eq!(keep.state(), 4);
    }

    // =============================================================================
    // SHARED STATE BOX
    // =============================================================================

    #[test]
    fn test_shared_slice_dispatch() {
        let shared = SharedStateBox::new(record(json!({"list": [], "user": null})));
        let list_calls = Arc::new(AtomicUsize::new(0));
        let user_calls = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&list_calls);
        let _list = shared.subscribe(
            Arc::new(move |_: &Record| {
                sink.fetch_add(1, Ordering::SeqCst);
            }),
            Some("list"),
        );
        let sink = Arc::clone(&user_calls);
        let _user = shared.subscribe(
            Arc::new(move |_: &Record| {
                sink.fetch_add(1, Ordering::SeqCst);
            }),
            Some("user"),
        );

        shared.dispatch(Dispatch::slice("list", json!([1, 2])));

        assert_eq!(shared.get_slice("list").as_deref(), Some(&json!([1, 2])));
        assert_eq!(list_calls.load(Ordering::SeqCst), 1);
        assert_eq!(user_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shared_state_bridged_onto_bus() {
        let scope = BusScope::new();
        let shared = SharedStateBox::new(record(json!({"theme": "light"})));
        let switches =
            DerivedState::count(&scope, "switches", ["theme:changed"], CountOptions::default(), add)
                .unwrap();
        let bridge =
            EventBus::bind(&scope, "bridge", Capabilities::new().fires(["theme:changed"])).unwrap();

        let _sub = shared.subscribe(
            Arc::new(move |_: &Record| {
                let _ = bridge.emit("theme:changed", json!(1));
            }),
            Some("theme"),
        );

        shared.dispatch(Dispatch::slice("theme", json!("dark")));
        shared.dispatch(Dispatch::slice("theme", json!("dark")));
        shared.dispatch(Dispatch::slice("theme", json!("light")));

        assert_eq!(switches.state(), 2);
    }

    #[test]
    fn test_encrypted_persistence_survives_remount() {
        let driver = Arc::new(MemoryStorage::new());
        let cipher = Arc::new(XorCipher(0x5a));
        let options = SharedStateOptions {
            storage_key: "session".to_string(),
            persist: true,
        };

        let first = SharedStateBox::with_storage(
            Record::new(),
            StorageAccessor::new(driver.clone()).with_encryptor(cipher.clone()),
            options.clone(),
        );
        first.dispatch(Dispatch::slice("token", json!("abc123")));

        let stored = driver.get_item("session").unwrap().unwrap();
        assert!(!stored.contains("abc123"));

        let second = SharedStateBox::with_storage(
            Record::new(),
            StorageAccessor::new(driver.clone()).with_encryptor(cipher),
            options.clone(),
        );
        assert!(second.hydrate());
        assert_eq!(second.get_state(), record(json!({"token": "abc123"})));

        // Without the cipher the stored text is opaque.
        let plain = SharedStateBox::with_storage(
            Record::new(),
            StorageAccessor::new(driver),
            options,
        );
        assert!(!plain.hydrate());
    }

    // =============================================================================
    // ROUTE MONITOR
    // =============================================================================

    #[test]
    fn test_route_changes_feed_a_list_binder() {
        let scope = BusScope::new();
        let visited = DerivedState::list(&scope, "visited", [ROUTE_CHANGED], Vec::new(), |prev, payload| {
            let mut next = prev.to_vec();
            next.push(payload["pathname"].as_str().unwrap_or_default().to_string());
            Ok(next)
        })
        .unwrap();
        let history = Arc::new(MemoryHistory::new("/"));
        let _monitor = RouteMonitor::bind(&scope, "router", history.clone()).unwrap();

        history.push("/products");
        history.push("/products/42?tab=reviews");
        history.back();

        assert_eq!(
            visited.state(),
            vec!["/products", "/products/42", "/products"]
        );
    }

    #[test]
    fn test_unsaved_changes_guard() {
        let scope = BusScope::new();
        let shared = SharedStateBox::new(record(json!({"dirty": true})));
        let history = Arc::new(MemoryHistory::new("/editor"));
        let monitor = RouteMonitor::bind(&scope, "router", history.clone()).unwrap();

        let state = shared.clone();
        let _guard = monitor.guard(move |_| {
            state.get_slice("dirty").is_some_and(|dirty| *dirty == json!(true))
        });

        assert!(!history.push("/home"));
        shared.dispatch(Dispatch::slice("dirty", json!(false)));
        assert!(history.push("/home"));
        assert_eq!(monitor.location().pathname, "/home");
    }

    // =============================================================================
    // DEBOUNCED SEARCH INTO SHARED STATE
    // =============================================================================

    struct Directory {
        names: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RemoteSource for Directory {
        type Item = String;

        async fn fetch(&self, query: &str) -> Result<Vec<String>, BinderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let filter = TextFilter::default();
            Ok(filter
                .apply(&self.names, query, String::as_str)
                .into_iter()
                .cloned()
                .collect())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_burst_stores_latest_results() {
        let directory = Arc::new(Directory {
            names: vec!["Ada".to_string(), "Adele".to_string(), "Grace".to_string()],
            calls: AtomicUsize::new(0),
        });
        let search = DebouncedQuery::new(Arc::clone(&directory), DebounceConfig::default());
        let shared = SharedStateBox::new(Record::new());

        let typed: [&'static str; 3] = ["a", "ad", "ade"];
        for (i, query) in typed.into_iter().enumerate() {
            let search = search.clone();
            let shared = shared.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50 * i as u64)).await;
                if let Some(Ok(hits)) = search.query(query).await {
                    shared.dispatch(Dispatch::slice("results", json!(hits)));
                }
            });
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(directory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(shared.get_slice("results").as_deref(), Some(&json!(["Adele"])));
    }
}
