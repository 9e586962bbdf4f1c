//! S3 (spec.md §8): five timed events at 200 ms apart, observed as five
//! separate reads each unlocked by exactly one virtual tick -- proving the
//! bridge delivers them one at a time rather than coalescing them into a
//! single burst. Driven against the virtual clock directly
//! (`WorkerCommand::Tick`) rather than real sleeps, the way
//! `crates/isolate-engine/src/timers.rs`'s own tests advance time. There is
//! no guest-visible binding for the virtual clock's value (only host-side
//! `TimerQueue`), so timing is asserted structurally: a read for event N only
//! resolves once N ticks of 200ms have been delivered, never before. A
//! `runtime.eval` call blocks the isolate's single worker-thread command
//! queue until its returned value (or promise) settles, so each read has to
//! be its own `runtime.eval` round trip interleaved with the ticks, not one
//! script that awaits across ticks.

use std::collections::BTreeMap;

use isolate_daemon::state::DaemonState;
use isolate_daemon::worker::WorkerCommand;
use isolate_protocol::{MarshalledValue, RequestTarget};
use isolate_test_utils::MockIpcClient;

#[tokio::test]
async fn five_sse_events_arrive_as_five_separate_reads_one_per_tick() {
    let state = DaemonState::new(8, 64 * 1024 * 1024);
    let (client_half, server_half) = tokio::io::duplex(64 * 1024);
    tokio::spawn(isolate_daemon::multiplexer::run(server_half, state.clone()));

    let mut client = MockIpcClient::new(client_half);

    let mut options = BTreeMap::new();
    options.insert(
        "capabilities".to_owned(),
        MarshalledValue::Sequence(vec![MarshalledValue::String("timers".to_owned())]),
    );
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

    let setup = r#"
        const stream = new ReadableStream({
            start(controller) { globalThis.__ctrl = controller; }
        });
        globalThis.__reader = stream.getReader();
        let __n = 0;
        globalThis.__timer = setInterval(() => {
            __n++;
            globalThis.__ctrl.enqueue(`event-${__n}`);
            if (__n >= 5) {
                clearInterval(globalThis.__timer);
                globalThis.__ctrl.close();
            }
        }, 200);
        "ready"
    "#;
    let ready = client
        .call(RequestTarget::Isolate(isolate_id.clone()), "runtime.eval", vec![MarshalledValue::String(setup.to_owned())])
        .await
        .expect("setting up the interval should succeed");
    assert_eq!(ready, MarshalledValue::String("ready".to_owned()));

    let read_one = r#"
        (async () => {
            function decode(bytes) {
                let s = "";
                for (let i = 0; i < bytes.length; i++) s += String.fromCharCode(bytes[i]);
                return s;
            }
            const { value, done } = await globalThis.__reader.read();
            return done ? null : decode(value);
        })()
    "#;

    for expected in 1..=5 {
        let (tx, rx) = tokio::sync::oneshot::channel();
        state
            .worker
            .send(WorkerCommand::Tick {
                isolate_id: isolate_id.clone(),
                delta_ms: 200,
                reply: tx,
            })
            .await
            .expect("worker thread should still be alive");
        rx.await.expect("tick reply channel should not be dropped").expect("tick should succeed");

        let chunk = client
            .call(RequestTarget::Isolate(isolate_id.clone()), "runtime.eval", vec![MarshalledValue::String(read_one.to_owned())])
            .await
            .expect("reading the chunk produced by this tick should succeed");
        assert_eq!(
            chunk,
            MarshalledValue::String(format!("event-{expected}")),
            "a single 200ms tick must unlock exactly one event, in order, not a batch"
        );
    }
}
