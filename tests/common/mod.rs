#![allow(dead_code)]

use http::Method;
use http::StatusCode;
use http_body_util::BodyExt;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use std::net::SocketAddr;
use turnstile::ApiDescription;
use turnstile::Body;
use turnstile::ConfigTurnstile;
use turnstile::ErrorModel;
use turnstile::Json;
use turnstile::Operation;
use turnstile::Param;
use turnstile::ResponseSpec;
use turnstile::ServerState;
use turnstile::TypedBody;

pub fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

pub fn remote_addr() -> SocketAddr {
    "127.0.0.1:12345".parse().unwrap()
}

pub fn make_request(
    method: Method,
    uri: &str,
    body: Option<&str>,
) -> hyper::Request<Body> {
    hyper::Request::builder()
        .method(method)
        .uri(uri)
        .body(match body {
            Some(content) => Body::with_content(content.to_string()),
            None => Body::empty(),
        })
        .unwrap()
}

pub async fn read_body(response: hyper::Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[derive(Deserialize, JsonSchema)]
pub struct EchoRequest {
    pub value: String,
}

#[derive(Serialize, JsonSchema)]
pub struct EchoResponse {
    pub value: String,
}

/// The canonical test API: an echo operation with path and query parameters
/// and an explicit error slot, a body-decoding echo, a text scalar, and a
/// pointer-to-scalar returning `false`.
pub fn echo_api() -> ApiDescription {
    let mut api = ApiDescription::new("My API", "1.0.0");

    api.register(
        Operation::new(Method::PUT, "/echo/:word")
            .description("Echo back an input word.")
            .param(Param::path("word", "The word to echo back"))
            .param(Param::query("greet", "Return a greeting"))
            .response(ResponseSpec::json(
                StatusCode::OK,
                "Successful echo response",
            ))
            .response(ResponseSpec::error(
                StatusCode::BAD_REQUEST,
                "Invalid input",
            ))
            .handler("echo_word", |word: String, greet: Option<bool>| {
                async move {
                    if word == "test" {
                        return (
                            StatusCode::BAD_REQUEST,
                            None,
                            Some(ErrorModel::new("Value not allowed: test")),
                        );
                    }

                    let value = if greet.unwrap_or(false) {
                        format!("Hello, {}", word)
                    } else {
                        word
                    };
                    (
                        StatusCode::OK,
                        Some(Json(EchoResponse { value })),
                        None,
                    )
                }
            }),
    )
    .unwrap();

    api.register(
        Operation::new(Method::PUT, "/echo")
            .description("Echo back an input word.")
            .response(ResponseSpec::json(
                StatusCode::OK,
                "Successful echo response",
            ))
            .handler("echo_body", |body: TypedBody<EchoRequest>| async move {
                let value = body.into_inner().value;
                (StatusCode::OK, Json(EchoResponse { value }))
            }),
    )
    .unwrap();

    api.register(
        Operation::new(Method::PUT, "/hello")
            .description("Say hello.")
            .response(ResponseSpec::text(
                StatusCode::OK,
                "Successful hello response",
            ))
            .handler("hello", || async {
                (StatusCode::OK, String::from("hello"))
            }),
    )
    .unwrap();

    api.register(
        Operation::new(Method::PUT, "/bool")
            .description("Return a zero-valued boolean.")
            .response(ResponseSpec::text(
                StatusCode::OK,
                "Successful zero bool response",
            ))
            .handler("bool_zero", || async { (StatusCode::OK, Some(false)) }),
    )
    .unwrap();

    api
}

pub fn echo_state() -> ServerState {
    ServerState::new(echo_api(), &ConfigTurnstile::default(), test_logger())
        .unwrap()
}
