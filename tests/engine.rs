mod common;

use apibridge::errors::{ToolError, ToolErrorKind};
use apibridge::managers::normalize::ResponseBody;
use common::{
    build_engine, bytes_response, header, json_response, FakeTokenSource, FakeTransport, BASE_URL,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn chat_endpoints() -> Value {
    json!([
        {
            "toolName": "send-chat-message",
            "pathPattern": "/chats/{chat-id}/messages",
            "method": "POST",
            "description": "Send a message to a chat",
            "scopes": ["ChatMessage.Send"],
            "llmTip": "Use plain text content."
        },
        {
            "toolName": "list-messages",
            "pathPattern": "/me/messages",
            "method": "GET",
            "fetchAllPages": true
        },
        {
            "toolName": "get-drive-item-content",
            "pathPattern": "/drives/{drive-id}/items/{item-id}",
            "method": "GET",
            "responseMode": "downloadUrl"
        }
    ])
}

fn chat_schemas() -> Value {
    json!({
        "send-chat-message": {
            "parameters": [
                {"name": "chat-id", "in": "path", "required": true, "type": "string"}
            ],
            "requestBody": {"name": "body", "required": true}
        },
        "list-messages": {
            "parameters": [
                {"name": "$top", "in": "query", "type": "integer"}
            ]
        },
        "get-drive-item-content": {
            "parameters": [
                {"name": "drive-id", "in": "path", "required": true},
                {"name": "item-id", "in": "path", "required": true}
            ]
        }
    })
}

fn args(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn send_chat_message_posts_json_with_bearer_token() {
    let transport = FakeTransport::new(|_| Ok(json_response(201, json!({"id": "m1"}))));
    let source = FakeTokenSource::new();
    let engine = build_engine(chat_endpoints(), chat_schemas(), transport.clone(), source.clone(), 10);

    let response = engine
        .execute(
            "send-chat-message",
            &args(json!({"chat-id": "19:abc", "body": {"body": {"content": "hi"}}})),
        )
        .await
        .expect("call succeeds");

    assert_eq!(response.status, 201);
    assert_eq!(response.json(), Some(&json!({"id": "m1"})));

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let sent = &requests[0];
    assert_eq!(sent.method, reqwest::Method::POST);
    assert_eq!(sent.url, format!("{}/chats/19%3Aabc/messages", BASE_URL));
    assert_eq!(header(sent, "authorization"), Some("Bearer token-1"));
    assert_eq!(header(sent, "content-type"), Some("application/json"));
    let body: Value = serde_json::from_slice(sent.body.as_ref().unwrap()).unwrap();
    assert_eq!(body, json!({"body": {"content": "hi"}}));
}

#[tokio::test]
async fn unknown_tool_fails_without_network_or_token_exchange() {
    let transport = FakeTransport::new(|_| Ok(json_response(200, json!({}))));
    let source = FakeTokenSource::new();
    let engine = build_engine(chat_endpoints(), chat_schemas(), transport.clone(), source.clone(), 10);

    let err = engine
        .execute("send-chat-mesage", &args(json!({})))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ToolErrorKind::NotFound);
    assert!(err.hint.unwrap_or_default().contains("send-chat-message"));
    assert_eq!(transport.count(), 0);
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn missing_path_argument_is_a_validation_error_naming_it() {
    let transport = FakeTransport::new(|_| Ok(json_response(200, json!({}))));
    let engine = build_engine(
        chat_endpoints(),
        chat_schemas(),
        transport.clone(),
        FakeTokenSource::new(),
        10,
    );

    let err = engine
        .execute("send-chat-message", &args(json!({"body": {}})))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ToolErrorKind::Validation);
    assert!(err.fields.iter().any(|f| f.field == "chat-id"));
    assert_eq!(transport.count(), 0);
}

#[tokio::test]
async fn rejected_credential_is_refreshed_and_retried_once() {
    let transport = FakeTransport::new(|req| {
        if header(req, "authorization") == Some("Bearer token-1") {
            Ok(json_response(401, json!({"error": {"code": "InvalidAuthenticationToken"}})))
        } else {
            Ok(json_response(201, json!({"id": "m2"})))
        }
    });
    let source = FakeTokenSource::new();
    let engine = build_engine(chat_endpoints(), chat_schemas(), transport.clone(), source.clone(), 10);

    let response = engine
        .execute("send-chat-message", &args(json!({"chat-id": "c1", "body": {}})))
        .await
        .expect("retry succeeds");

    assert_eq!(response.status, 201);
    assert_eq!(transport.count(), 2);
    assert_eq!(source.calls(), 2);
    assert_eq!(header(&transport.requests()[1], "authorization"), Some("Bearer token-2"));
}

#[tokio::test]
async fn second_rejection_is_an_authentication_error_without_third_attempt() {
    let transport = FakeTransport::new(|_| Ok(json_response(401, json!({"error": "nope"}))));
    let source = FakeTokenSource::new();
    let engine = build_engine(chat_endpoints(), chat_schemas(), transport.clone(), source.clone(), 10);

    let err = engine
        .execute("send-chat-message", &args(json!({"chat-id": "c1", "body": {}})))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ToolErrorKind::Authentication);
    assert_eq!(err.status, Some(401));
    assert_eq!(transport.count(), 2);
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn concurrent_calls_share_one_token_exchange() {
    let transport = FakeTransport::new(|_| Ok(json_response(201, json!({"id": "m"}))));
    let source = FakeTokenSource::new();
    let engine = Arc::new(build_engine(
        chat_endpoints(),
        chat_schemas(),
        transport.clone(),
        source.clone(),
        10,
    ));

    let mut handles = Vec::new();
    for i in 0..12 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .execute(
                    "send-chat-message",
                    &args(json!({"chat-id": format!("c{}", i), "body": {}})),
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("call succeeds");
    }

    assert_eq!(source.calls(), 1);
    assert_eq!(transport.count(), 12);
}

#[tokio::test]
async fn concurrent_rejections_trigger_a_single_refresh() {
    let transport = FakeTransport::new(|req| {
        if header(req, "authorization") == Some("Bearer token-1") {
            Ok(json_response(401, json!({})))
        } else {
            Ok(json_response(201, json!({"id": "m"})))
        }
    });
    let source = FakeTokenSource::new();
    let engine = Arc::new(build_engine(
        chat_endpoints(),
        chat_schemas(),
        transport.clone(),
        source.clone(),
        10,
    ));

    let calls = (0..8).map(|i| {
        let engine = engine.clone();
        async move {
            engine
                .execute(
                    "send-chat-message",
                    &args(json!({"chat-id": format!("c{}", i), "body": {}})),
                )
                .await
        }
    });
    for result in futures::future::join_all(calls).await {
        assert_eq!(result.expect("call succeeds").status, 201);
    }

    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn fetch_all_pages_concatenates_items_in_order() {
    let transport = FakeTransport::new(|req| {
        let body = if req.url.contains("skiptoken=2") {
            json!({"value": [3, 4], "@odata.nextLink": format!("{}/me/messages?$skiptoken=3", BASE_URL)})
        } else if req.url.contains("skiptoken=3") {
            json!({"value": [5]})
        } else {
            json!({"value": [1, 2], "@odata.nextLink": format!("{}/me/messages?$skiptoken=2", BASE_URL)})
        };
        Ok(json_response(200, body))
    });
    let engine = build_engine(
        chat_endpoints(),
        chat_schemas(),
        transport.clone(),
        FakeTokenSource::new(),
        10,
    );

    let response = engine
        .execute("list-messages", &args(json!({"$top": 2})))
        .await
        .expect("pagination succeeds");

    assert_eq!(response.pages, Some(3));
    let body = response.json().unwrap();
    assert_eq!(body["value"], json!([1, 2, 3, 4, 5]));
    assert!(body.get("@odata.nextLink").is_none());

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].url, format!("{}/me/messages?$top=2", BASE_URL));
    assert!(requests.iter().all(|r| header(r, "authorization") == Some("Bearer token-1")));
}

#[tokio::test]
async fn pagination_cap_returns_partial_result_in_error() {
    let counter = Arc::new(AtomicUsize::new(0));
    let seen = counter.clone();
    let transport = FakeTransport::new(move |_| {
        let n = seen.fetch_add(1, Ordering::SeqCst);
        Ok(json_response(
            200,
            json!({
                "value": [n],
                "@odata.nextLink": format!("{}/me/messages?$skiptoken={}", BASE_URL, n + 1),
            }),
        ))
    });
    let engine = build_engine(
        chat_endpoints(),
        chat_schemas(),
        transport.clone(),
        FakeTokenSource::new(),
        3,
    );

    let err = engine
        .execute("list-messages", &args(json!({})))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ToolErrorKind::PaginationLimitExceeded);
    assert_eq!(err.partial_result().unwrap()["value"], json!([0, 1, 2]));
    assert_eq!(transport.count(), 3);
}

#[tokio::test]
async fn continuation_link_to_another_host_is_refused() {
    let transport = FakeTransport::new(|_| {
        Ok(json_response(
            200,
            json!({"value": [1], "@odata.nextLink": "https://evil.example.net/steal"}),
        ))
    });
    let engine = build_engine(
        chat_endpoints(),
        chat_schemas(),
        transport.clone(),
        FakeTokenSource::new(),
        10,
    );

    let err = engine
        .execute("list-messages", &args(json!({})))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ToolErrorKind::Transport);
    assert!(!err.retryable);
    assert_eq!(transport.count(), 1);
}

#[tokio::test]
async fn download_url_is_followed_without_forwarding_credentials() {
    let transport = FakeTransport::new(|req| {
        if req.url.starts_with("https://files.example.net/") {
            Ok(bytes_response(200, "application/octet-stream", &[0, 1, 2, 3]))
        } else {
            Ok(json_response(
                200,
                json!({
                    "id": "item",
                    "@microsoft.graph.downloadUrl": "https://files.example.net/blob?sig=abc"
                }),
            ))
        }
    });
    let engine = build_engine(
        chat_endpoints(),
        chat_schemas(),
        transport.clone(),
        FakeTokenSource::new(),
        10,
    );

    let response = engine
        .execute(
            "get-drive-item-content",
            &args(json!({"drive-id": "d1", "item-id": "i1"})),
        )
        .await
        .expect("download succeeds");

    match &response.body {
        ResponseBody::Binary { bytes, base64 } => {
            assert_eq!(*bytes, 4);
            assert_eq!(base64, "AAECAw==");
        }
        other => panic!("expected binary body, got {:?}", other),
    }
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].url, "https://files.example.net/blob?sig=abc");
    assert!(header(&requests[1], "authorization").is_none());
}

#[tokio::test]
async fn same_origin_download_reference_is_fetched_with_credentials() {
    let transport = FakeTransport::new(|req| {
        if req.url.ends_with("/content") {
            Ok(bytes_response(200, "text/plain", b"hello"))
        } else {
            let mut resp = bytes_response(202, "text/plain", b"");
            resp.headers.insert(
                "location",
                format!("{}/drives/d1/items/i1/content", BASE_URL).parse().unwrap(),
            );
            Ok(resp)
        }
    });
    let engine = build_engine(
        chat_endpoints(),
        chat_schemas(),
        transport.clone(),
        FakeTokenSource::new(),
        10,
    );

    let response = engine
        .execute(
            "get-drive-item-content",
            &args(json!({"drive-id": "d1", "item-id": "i1"})),
        )
        .await
        .expect("download succeeds");

    assert_eq!(
        response.body,
        ResponseBody::Text {
            text: "hello".to_string()
        }
    );
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(header(&requests[1], "authorization"), Some("Bearer token-1"));
}

#[tokio::test]
async fn download_mode_without_reference_is_a_remote_api_error() {
    let transport = FakeTransport::new(|_| Ok(json_response(200, json!({"id": "item"}))));
    let engine = build_engine(
        chat_endpoints(),
        chat_schemas(),
        transport.clone(),
        FakeTokenSource::new(),
        10,
    );

    let err = engine
        .execute(
            "get-drive-item-content",
            &args(json!({"drive-id": "d1", "item-id": "i1"})),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, ToolErrorKind::RemoteApi);
    assert_eq!(err.code, "DOWNLOAD_REFERENCE_MISSING");
}

#[tokio::test]
async fn non_success_status_carries_remote_body() {
    let transport = FakeTransport::new(|_| {
        Ok(json_response(
            404,
            json!({"error": {"code": "NotFound", "message": "chat missing"}}),
        ))
    });
    let engine = build_engine(
        chat_endpoints(),
        chat_schemas(),
        transport.clone(),
        FakeTokenSource::new(),
        10,
    );

    let err = engine
        .execute("send-chat-message", &args(json!({"chat-id": "c1", "body": {}})))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ToolErrorKind::RemoteApi);
    assert_eq!(err.status, Some(404));
    assert!(!err.retryable);
    let body = err.details.unwrap()["body"].as_str().unwrap().to_string();
    assert!(body.contains("chat missing"));
    assert_eq!(transport.count(), 1);
}

#[tokio::test]
async fn timeout_is_a_transport_error_and_does_not_refresh() {
    let transport = FakeTransport::new(|_| Err(ToolError::timeout("request timed out")));
    let source = FakeTokenSource::new();
    let engine = build_engine(chat_endpoints(), chat_schemas(), transport.clone(), source.clone(), 10);

    let err = engine
        .execute("send-chat-message", &args(json!({"chat-id": "c1", "body": {}})))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ToolErrorKind::Transport);
    assert_eq!(err.code, "TIMEOUT");
    assert!(err.retryable);
    assert_eq!(transport.count(), 1);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn list_tools_advertises_description_scopes_and_schema() {
    let transport = FakeTransport::new(|_| Ok(json_response(200, json!({}))));
    let engine = build_engine(
        chat_endpoints(),
        chat_schemas(),
        transport,
        FakeTokenSource::new(),
        10,
    );

    let tools = engine.list_tools();
    assert_eq!(tools.len(), 3);
    let send = tools.iter().find(|t| t.name == "send-chat-message").unwrap();
    assert!(send.description.starts_with("Send a message to a chat"));
    assert!(send.description.contains("Use plain text content."));
    assert!(send.description.contains("ChatMessage.Send"));
    assert_eq!(send.input_schema["type"], "object");
    assert!(send.input_schema["required"]
        .as_array()
        .unwrap()
        .contains(&json!("chat-id")));

    let list = tools.iter().find(|t| t.name == "list-messages").unwrap();
    assert_eq!(list.description, "GET /me/messages");
}

#[tokio::test]
async fn execute_value_rejects_non_object_arguments() {
    let transport = FakeTransport::new(|_| Ok(json_response(200, json!({}))));
    let engine = build_engine(
        chat_endpoints(),
        chat_schemas(),
        transport.clone(),
        FakeTokenSource::new(),
        10,
    );

    let err = engine
        .execute_value("list-messages", Some(&json!([1, 2])))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ToolErrorKind::Validation);
    assert_eq!(transport.count(), 0);
}
