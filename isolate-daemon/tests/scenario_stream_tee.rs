//! S4 (spec.md §8): a guest `ReadableStream` is teed into two independent
//! branches; one is read directly, the other piped through a
//! `TransformStream` passthrough. Both branches must observe every chunk,
//! proving `tee` fan-out and `pipeThrough` don't drop or reorder chunks
//! (`crates/isolate-bridge/src/globals/streams.rs`'s
//! `tee_delivers_every_chunk_to_both_branches` unit test already covers this
//! at the Rust layer; this drives the same guarantee from real guest script).

use std::collections::BTreeMap;

use isolate_daemon::state::DaemonState;
use isolate_protocol::{MarshalledValue, RequestTarget};
use isolate_test_utils::MockIpcClient;

#[tokio::test]
async fn tee_and_transform_passthrough_both_see_every_chunk() {
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
        (async () => {
            function decode(bytes) {
                let s = "";
                for (let i = 0; i < bytes.length; i++) s += String.fromCharCode(bytes[i]);
                return s;
            }
            const source = new ReadableStream({
                start(controller) {
                    controller.enqueue("a");
                    controller.enqueue("b");
                    controller.enqueue("c");
                    controller.close();
                }
            });
            const [branchA, branchB] = source.tee();

            const readerA = branchA.getReader();
            const outA = [];
            while (true) {
                const { value, done } = await readerA.read();
                if (done) break;
                outA.push(decode(value));
            }

            const transform = new TransformStream();
            const through = await branchB.pipeThrough(transform);
            const readerT = through.getReader();
            const outT = [];
            while (true) {
                const { value, done } = await readerT.read();
                if (done) break;
                outT.push(decode(value));
            }

            return { outA, outT };
        })()
    "#;
    let result = client
        .call(RequestTarget::Isolate(isolate_id), "runtime.eval", vec![MarshalledValue::String(script.to_owned())])
        .await
        .expect("tee/transform script should succeed");

    let MarshalledValue::Record(fields) = result else {
        panic!("script must return a record");
    };

    let expected = vec![
        MarshalledValue::String("a".to_owned()),
        MarshalledValue::String("b".to_owned()),
        MarshalledValue::String("c".to_owned()),
    ];

    let Some(MarshalledValue::Sequence(out_a)) = fields.get("outA") else {
        panic!("missing outA");
    };
    assert_eq!(out_a, &expected, "the directly-read tee branch must see every chunk in order");

    let Some(MarshalledValue::Sequence(out_t)) = fields.get("outT") else {
        panic!("missing outT");
    };
    assert_eq!(out_t, &expected, "the transformed tee branch must pass every chunk through unchanged");
}
