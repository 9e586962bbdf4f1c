//! S6 (spec.md §8): `atob`/`btoa` round-trip, accept missing padding on
//! decode, and reject non-Latin-1 input on encode. Errors are asserted by
//! message substring (`toThrow`'s own convention in
//! `crates/isolate-engine/src/bootstrap.js`), not by a distinct `.name` --
//! ops surface `BridgeError`s to the guest as a plain `Error` whose message
//! embeds the DOM exception name (`crates/isolate-bridge/src/
//! error_bridge.rs`'s `Display` impl), there's no guest-visible
//! `DOMException` class to carry `.name` separately.

use std::collections::BTreeMap;

use isolate_daemon::state::DaemonState;
use isolate_protocol::{MarshalledValue, RequestTarget};
use isolate_test_utils::MockIpcClient;

#[tokio::test]
async fn base64_round_trips_and_rejects_non_latin1_input() {
    let state = DaemonState::new(8, 64 * 1024 * 1024);
    let (client_half, server_half) = tokio::io::duplex(64 * 1024);
    tokio::spawn(isolate_daemon::multiplexer::run(server_half, state));

    let mut client = MockIpcClient::new(client_half);

    let mut options = BTreeMap::new();
    options.insert("capabilities".to_owned(), MarshalledValue::Sequence(Vec::new()));
    let created = client
        .call(RequestTarget::Connection, "createRuntime", vec![MarshalledValue::record(options)])
        .await
        .expect("createRuntime should succeed");
    let MarshalledValue::Record(fields) = created else {
        panic!("createRuntime must return a record");
    };
    let Some(MarshalledValue::String(isolate_id)) = fields.get("isolateId") else {
        panic!("createRuntime response missing isolateId");
    };
    let isolate_id = isolate_id.clone();

    let script = r#"
        (() => {
            const roundTrip = atob(btoa("hello")) === "hello";
            const encoded = btoa("hello") === "aGVsbG8=";
            const unpadded = atob("aGVsbG8") === "hello";

            let threw = false;
            let message = "";
            try {
                btoa("hello 世界");
            } catch (err) {
                threw = true;
                message = String(err.message || err);
            }

            return { roundTrip, encoded, unpadded, threw, message };
        })()
    "#;
    let result = client
        .call(RequestTarget::Isolate(isolate_id), "runtime.eval", vec![MarshalledValue::String(script.to_owned())])
        .await
        .expect("base64 script should succeed");

    let MarshalledValue::Record(fields) = result else {
        panic!("script must return a record");
    };
    assert_eq!(fields.get("roundTrip"), Some(&MarshalledValue::Bool(true)), "atob(btoa(x)) must equal x");
    assert_eq!(fields.get("encoded"), Some(&MarshalledValue::Bool(true)), "btoa(\"hello\") must equal \"aGVsbG8=\"");
    assert_eq!(fields.get("unpadded"), Some(&MarshalledValue::Bool(true)), "atob must accept a string missing its padding");
    assert_eq!(fields.get("threw"), Some(&MarshalledValue::Bool(true)), "btoa must throw on input outside Latin-1");

    let Some(MarshalledValue::String(message)) = fields.get("message") else {
        panic!("missing thrown error message");
    };
    assert!(
        message.contains("InvalidCharacterError"),
        "btoa's thrown error must name InvalidCharacterError, got {message:?}"
    );
}
