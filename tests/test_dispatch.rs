//! End-to-end dispatch tests driving the frozen server state directly, with
//! no sockets involved.

mod common;

use common::echo_api;
use common::echo_state;
use common::make_request;
use common::read_body;
use common::remote_addr;
use common::test_logger;
use http::Method;
use http::StatusCode;
use turnstile::ApiDescription;
use turnstile::ConfigTurnstile;
use turnstile::Operation;
use turnstile::Param;
use turnstile::ResponseSpec;
use turnstile::ServerState;

#[tokio::test]
async fn test_echo_path_parameter() {
    let state = echo_state();
    let response = state
        .handle_request(
            make_request(Method::PUT, "/echo/world", None),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_body(response).await, "{\"value\":\"world\"}\n");
}

#[tokio::test]
async fn test_echo_query_parameter() {
    let state = echo_state();
    let response = state
        .handle_request(
            make_request(Method::PUT, "/echo/world?greet=true", None),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_body(response).await, "{\"value\":\"Hello, world\"}\n");
}

#[tokio::test]
async fn test_bad_boolean_token_is_rejected_before_the_handler() {
    let state = echo_state();
    let response = state
        .handle_request(
            make_request(Method::PUT, "/echo/world?greet=bad", None),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_body(response).await;
    let error: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(error["message"].is_string());
}

#[tokio::test]
async fn test_handler_reported_error() {
    let state = echo_state();
    let response = state
        .handle_request(
            make_request(Method::PUT, "/echo/test", None),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        read_body(response).await,
        "{\"message\":\"Value not allowed: test\"}\n"
    );
}

#[tokio::test]
async fn test_body_type_mismatch_is_rejected() {
    let state = echo_state();
    let response = state
        .handle_request(
            make_request(Method::PUT, "/echo", Some(r#"{"value": 123}"#)),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_body_echo() {
    let state = echo_state();
    let response = state
        .handle_request(
            make_request(Method::PUT, "/echo", Some(r#"{"value": "hello"}"#)),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_body(response).await, "{\"value\":\"hello\"}\n");
}

#[tokio::test]
async fn test_body_with_unknown_fields_is_tolerated() {
    let state = echo_state();
    let response = state
        .handle_request(
            make_request(
                Method::PUT,
                "/echo",
                Some(r#"{"value": "hello", "extra": [1, 2, 3]}"#),
            ),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_text_scalar_response() {
    let state = echo_state();
    let response = state
        .handle_request(
            make_request(Method::PUT, "/hello", None),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type =
        response.headers().get(http::header::CONTENT_TYPE).unwrap().clone();
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));
    // No trailing newline on text bodies.
    assert_eq!(read_body(response).await, "hello");
}

#[tokio::test]
async fn test_zero_scalar_renders_literal_token() {
    let state = echo_state();
    let response = state
        .handle_request(
            make_request(Method::PUT, "/bool", None),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_body(response).await, "false");
}

#[tokio::test]
async fn test_schema_and_docs_endpoints() {
    let state = echo_state();

    let response = state
        .handle_request(
            make_request(Method::GET, "/openapi.json", None),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_body(response).await;
    let document: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(document["info"]["title"], "My API");

    let response = state
        .handle_request(
            make_request(Method::GET, "/docs", None),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(read_body(response).await.contains("/openapi.json"));
}

#[tokio::test]
async fn test_unknown_path_and_wrong_method() {
    let state = echo_state();

    let response = state
        .handle_request(
            make_request(Method::PUT, "/missing", None),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = state
        .handle_request(
            make_request(Method::GET, "/hello", None),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_dispatch_is_idempotent() {
    let state = echo_state();
    let mut results = Vec::new();
    for _ in 0..2 {
        let response = state
            .handle_request(
                make_request(Method::PUT, "/echo/world?greet=true", None),
                remote_addr(),
            )
            .await;
        let status = response.status();
        results.push((status, read_body(response).await));
    }
    assert_eq!(results[0], results[1]);
}

#[tokio::test]
async fn test_responses_carry_a_request_id() {
    let state = echo_state();
    let response = state
        .handle_request(
            make_request(Method::PUT, "/hello", None),
            remote_addr(),
        )
        .await;
    assert!(response.headers().contains_key(turnstile::HEADER_REQUEST_ID));
}

#[tokio::test]
async fn test_required_query_parameter_is_required() {
    let mut api = ApiDescription::new("My API", "1.0.0");
    api.register(
        Operation::new(Method::GET, "/count")
            .param(Param::query("count", "How many"))
            .response(ResponseSpec::text(StatusCode::OK, "The count"))
            .handler("count", |count: u32| async move {
                (StatusCode::OK, count.to_string())
            }),
    )
    .unwrap();
    let state =
        ServerState::new(api, &ConfigTurnstile::default(), test_logger())
            .unwrap();

    let response = state
        .handle_request(
            make_request(Method::GET, "/count?count=3", None),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_body(response).await, "3");

    let response = state
        .handle_request(make_request(Method::GET, "/count", None), remote_addr())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_only_handler() {
    let mut api = ApiDescription::new("My API", "1.0.0");
    api.register(
        Operation::new(Method::DELETE, "/things/:thing")
            .param(Param::path("thing", "The thing to delete"))
            .response(ResponseSpec::json(
                StatusCode::NO_CONTENT,
                "Successful deletion",
            ))
            .handler("thing_delete", |_thing: String| async {
                StatusCode::NO_CONTENT
            }),
    )
    .unwrap();
    let state =
        ServerState::new(api, &ConfigTurnstile::default(), test_logger())
            .unwrap();

    let response = state
        .handle_request(
            make_request(Method::DELETE, "/things/one", None),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(read_body(response).await, "");
}

#[tokio::test]
async fn test_panicking_handler_maps_to_internal_error() {
    let mut api = ApiDescription::new("My API", "1.0.0");
    api.register(
        Operation::new(Method::GET, "/boom")
            .response(ResponseSpec::json(StatusCode::OK, "Never happens"))
            .handler("boom", || async {
                if std::env::var("TURNSTILE_NO_BOOM").is_err() {
                    panic!("something went sideways");
                }
                StatusCode::OK
            }),
    )
    .unwrap();
    let state =
        ServerState::new(api, &ConfigTurnstile::default(), test_logger())
            .unwrap();

    let response = state
        .handle_request(make_request(Method::GET, "/boom", None), remote_addr())
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    // The body is the generic error shape, with no internal details.
    assert_eq!(
        read_body(response).await,
        "{\"message\":\"Internal Server Error\"}\n"
    );
}

#[tokio::test]
async fn test_mismatched_content_type_is_rejected() {
    let state = echo_state();
    let request = hyper::Request::builder()
        .method(Method::PUT)
        .uri("/echo")
        .header(http::header::CONTENT_TYPE, "text/plain")
        .body(turnstile::Body::with_content(r#"{"value": "hello"}"#))
        .unwrap();
    let response = state.handle_request(request, remote_addr()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let state = echo_state();
    let huge = format!(r#"{{"value": "{}"}}"#, "x".repeat(4096));
    let response = state
        .handle_request(
            make_request(Method::PUT, "/echo", Some(&huge)),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_path_captures_are_percent_decoded() {
    let state = echo_state();
    let response = state
        .handle_request(
            make_request(Method::PUT, "/echo/hello%20there", None),
            remote_addr(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_body(response).await, "{\"value\":\"hello there\"}\n");
}

#[tokio::test]
async fn test_registered_operations_survive_freezing() {
    // Freezing consumes the description; make sure every registered
    // operation is still dispatchable afterwards.
    let api = echo_api();
    let state =
        ServerState::new(api, &ConfigTurnstile::default(), test_logger())
            .unwrap();
    for (method, path) in
        [(Method::PUT, "/echo/x"), (Method::PUT, "/hello"), (Method::PUT, "/bool")]
    {
        let response = state
            .handle_request(make_request(method, path, None), remote_addr())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
