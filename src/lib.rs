//! Turnstile lets you register a plain async function as an HTTP operation
//! handler, with no manual request parsing, validation, or response
//! encoding.  From the function's signature and the operation's declarative
//! metadata (path template, parameter descriptors, declared responses), the
//! crate derives — once, at registration time — a binding plan that is
//! replayed on every incoming request: extract path and query parameters,
//! decode and validate a request body if one is declared, invoke the
//! handler, and serialize whatever the handler returned into an HTTP
//! response.  The same type information simultaneously produces an OpenAPI
//! document describing every registered operation, so the implementation and
//! the published schema cannot diverge.
//!
//! ## Registering operations
//!
//! An operation couples an HTTP method and a `:name`-style path template
//! with parameter descriptors, response descriptors, and a handler:
//!
//! ```
//! use http::{Method, StatusCode};
//! use schemars::JsonSchema;
//! use serde::Serialize;
//! use turnstile::{
//!     ApiDescription, ErrorModel, Json, Operation, Param, ResponseSpec,
//! };
//!
//! #[derive(Serialize, JsonSchema)]
//! struct EchoResponse {
//!     value: String,
//! }
//!
//! let mut api = ApiDescription::new("Echo API", "1.0.0");
//! api.register(
//!     Operation::new(Method::PUT, "/echo/:word")
//!         .description("Echo back an input word.")
//!         .param(Param::path("word", "The word to echo back"))
//!         .param(Param::query("greet", "Return a greeting"))
//!         .response(ResponseSpec::json(StatusCode::OK, "Successful echo"))
//!         .response(ResponseSpec::error(
//!             StatusCode::BAD_REQUEST,
//!             "Invalid input",
//!         ))
//!         .handler("echo", |word: String, greet: Option<bool>| async move {
//!             if word == "test" {
//!                 return (
//!                     StatusCode::BAD_REQUEST,
//!                     None,
//!                     Some(ErrorModel::new("Value not allowed: test")),
//!                 );
//!             }
//!             let value = if greet.unwrap_or(false) {
//!                 format!("Hello, {}", word)
//!             } else {
//!                 word
//!             };
//!             (StatusCode::OK, Some(Json(EchoResponse { value })), None)
//!         }),
//! )
//! .unwrap();
//! ```
//!
//! ## Handler signatures
//!
//! Handler *arguments* are classified positionally against the operation's
//! parameter descriptors: the Nth descriptor describes the Nth argument,
//! which must be a scalar (`String`, `bool`, integers, floats) parsed
//! strictly from the raw path or query string, or an `Option` of a query
//! scalar if the parameter may be absent.  An argument with no descriptor is
//! the request body — [`TypedBody<T>`] — of which there can be at most one.
//! Any mismatch between descriptors and arguments is a registration error,
//! surfaced before the server starts; a malformed value at request time is a
//! 400 and the handler is never invoked.
//!
//! Handler *return values* start with the HTTP status code, written to the
//! response verbatim, optionally followed by a body-role value and an
//! error-role slot; see [`HandlerResult`] for the supported shapes.
//!
//! ## Serving
//!
//! [`HttpServerStarter`] freezes an `ApiDescription` into an immutable
//! [`ServerState`] snapshot (including the serialized schema document) and
//! serves it with hyper.  The schema is available at `GET /openapi.json` and
//! a documentation page at `GET /docs`.  Configuration ([`ConfigTurnstile`])
//! and logging ([`ConfigLogging`]) follow the usual serde-friendly pattern
//! so they can be embedded in an application's own config file.
//!
//! The core introduces no threads, queues, or locks of its own: all shared
//! state is written during registration and read-only afterwards, and all
//! per-request state is owned by the single invocation handling that
//! request.

mod api_description;
mod binding;
mod body;
mod config;
mod docs;
mod error;
mod handler;
mod http_util;
mod logging;
mod response;
mod router;
mod schema_util;
mod server;

#[macro_use]
extern crate slog;

pub use api_description::ApiDescription;
pub use api_description::ContentKind;
pub use api_description::OpenApiDefinition;
pub use api_description::Operation;
pub use api_description::Param;
pub use api_description::ParamSource;
pub use api_description::ResponseSpec;
pub use binding::ArgPlan;
pub use binding::ArgRule;
pub use binding::ArgSet;
pub use binding::HandlerArg;
pub use binding::ParameterMeta;
pub use binding::SignatureInputs;
pub use binding::TypedBody;
pub use body::Body;
pub use config::ConfigTurnstile;
pub use error::ErrorModel;
pub use error::HttpError;
pub use error::RegistrationError;
pub use handler::HandlerFn;
pub use handler::RequestContext;
pub use http_util::CONTENT_TYPE_JSON;
pub use http_util::CONTENT_TYPE_TEXT;
pub use http_util::HEADER_REQUEST_ID;
pub use logging::ConfigLogging;
pub use logging::ConfigLoggingIfExists;
pub use logging::ConfigLoggingLevel;
pub use response::HandlerResult;
pub use response::Json;
pub use response::Payload;
pub use response::PayloadRule;
pub use response::PayloadShape;
pub use response::ResponseEnvelope;
pub use response::ResponsePayload;
pub use response::ResultRules;
pub use schema_util::SchemaSource;
pub use server::HttpServer;
pub use server::HttpServerStarter;
pub use server::ServerConfig;
pub use server::ServerState;
