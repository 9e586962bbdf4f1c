//! S2 (spec.md §8): upload/list/read/delete against the filesystem
//! capability's scratch root, end to end through a guest `serve.fetch`
//! handler built on `globalThis.files` (`crates/isolate-engine/src/
//! bootstrap.js`), the same shape `GET/POST/DELETE /api/files...` spec.md
//! describes.

use std::collections::BTreeMap;

use isolate_daemon::state::DaemonState;
use isolate_protocol::{MarshalledValue, RequestTarget};
use isolate_test_utils::MockIpcClient;

async fn create_isolate(client: &mut MockIpcClient<tokio::io::DuplexStream>) -> String {
    let mut options = BTreeMap::new();
    options.insert(
        "capabilities".to_owned(),
        MarshalledValue::Sequence(vec![
            MarshalledValue::String("serve".to_owned()),
            MarshalledValue::String("filesystem".to_owned()),
        ]),
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
    isolate_id.clone()
}

fn dispatch_request(method: &str, url: &str, body: Option<&str>) -> MarshalledValue {
    let mut fields = BTreeMap::new();
    fields.insert("method".to_owned(), MarshalledValue::String(method.to_owned()));
    fields.insert("url".to_owned(), MarshalledValue::String(url.to_owned()));
    fields.insert("headers".to_owned(), MarshalledValue::record(BTreeMap::new()));
    if let Some(body) = body {
        // `Request`'s raw-dispatch-record branch (`bootstrap.js`) expects a
        // base64 string for `body`, matching what `dispatch_http` sends in
        // production (`MarshalledValue::bytes` -> `to_json`'s base64 string).
        fields.insert("body".to_owned(), MarshalledValue::bytes(body.as_bytes().to_vec()));
    }
    MarshalledValue::record(fields)
}

fn response_fields(value: MarshalledValue) -> BTreeMap<String, MarshalledValue> {
    match value {
        MarshalledValue::Record(fields) => fields,
        other => panic!("expected a Response-shaped record, got {other:?}"),
    }
}

fn status_of(fields: &BTreeMap<String, MarshalledValue>) -> f64 {
    match fields.get("status") {
        Some(MarshalledValue::Number(n)) => *n,
        _ => 200.0,
    }
}

fn body_of(fields: &BTreeMap<String, MarshalledValue>) -> String {
    match fields.get("body") {
        Some(MarshalledValue::String(s)) => s.clone(),
        _ => String::new(),
    }
}

#[tokio::test]
async fn upload_list_read_and_delete_a_file() {
    let state = DaemonState::new(8, 64 * 1024 * 1024);
    let (client_half, server_half) = tokio::io::duplex(64 * 1024);
    tokio::spawn(isolate_daemon::multiplexer::run(server_half, state));

    let mut client = MockIpcClient::new(client_half);
    let isolate_id = create_isolate(&mut client).await;

    let script = r#"
        serve({
            async fetch(req) {
                const url = req.url;
                if (req.method === "POST" && url === "/api/files/test.txt") {
                    await files.write("test.txt", await req.text());
                    return Response.json({ success: true });
                }
                if (req.method === "GET" && url === "/api/files") {
                    return Response.json(await files.list());
                }
                if (req.method === "GET" && url === "/api/files/test.txt") {
                    try {
                        const bytes = await files.read("test.txt");
                        let text = "";
                        for (let i = 0; i < bytes.length; i++) text += String.fromCharCode(bytes[i]);
                        return new Response(text);
                    } catch (err) {
                        return Response.json({ error: "File not found" }, { status: 404 });
                    }
                }
                if (req.method === "DELETE" && url === "/api/files/test.txt") {
                    await files.delete("test.txt");
                    return Response.json({ success: true });
                }
                return Response.json({ error: "File not found" }, { status: 404 });
            }
        });
    "#;
    client
        .call(RequestTarget::Isolate(isolate_id.clone()), "runtime.eval", vec![MarshalledValue::String(script.to_owned())])
        .await
        .expect("registering the fetch handler should succeed");

    let contents = "Hello, this is a test file content!";
    let upload = client
        .call(
            RequestTarget::Isolate(isolate_id.clone()),
            "runtime.fetch.dispatchRequest",
            vec![dispatch_request("POST", "/api/files/test.txt", Some(contents))],
        )
        .await
        .expect("upload should succeed");
    let upload = response_fields(upload);
    assert_eq!(status_of(&upload), 200.0);
    let parsed: serde_json::Value = serde_json::from_str(&body_of(&upload)).unwrap();
    assert_eq!(parsed["success"], true);

    let listing = client
        .call(
            RequestTarget::Isolate(isolate_id.clone()),
            "runtime.fetch.dispatchRequest",
            vec![dispatch_request("GET", "/api/files", None)],
        )
        .await
        .expect("list should succeed");
    let listing = response_fields(listing);
    let entries: serde_json::Value = serde_json::from_str(&body_of(&listing)).unwrap();
    let entries = entries.as_array().expect("listing must be an array");
    assert!(entries
        .iter()
        .any(|entry| entry["name"] == "test.txt" && entry["size"] == contents.len() as u64));

    let read = client
        .call(
            RequestTarget::Isolate(isolate_id.clone()),
            "runtime.fetch.dispatchRequest",
            vec![dispatch_request("GET", "/api/files/test.txt", None)],
        )
        .await
        .expect("read should succeed");
    let read = response_fields(read);
    assert_eq!(body_of(&read), contents);

    let delete = client
        .call(
            RequestTarget::Isolate(isolate_id.clone()),
            "runtime.fetch.dispatchRequest",
            vec![dispatch_request("DELETE", "/api/files/test.txt", None)],
        )
        .await
        .expect("delete should succeed");
    let delete = response_fields(delete);
    assert_eq!(status_of(&delete), 200.0);
    let parsed: serde_json::Value = serde_json::from_str(&body_of(&delete)).unwrap();
    assert_eq!(parsed["success"], true);

    let read_again = client
        .call(
            RequestTarget::Isolate(isolate_id),
            "runtime.fetch.dispatchRequest",
            vec![dispatch_request("GET", "/api/files/test.txt", None)],
        )
        .await
        .expect("dispatch itself should still succeed");
    let read_again = response_fields(read_again);
    assert_eq!(status_of(&read_again), 404.0);
    let parsed: serde_json::Value = serde_json::from_str(&body_of(&read_again)).unwrap();
    assert_eq!(parsed["error"], "File not found");
}
