//! Error handling facilities
//!
//! There are two distinct failure domains here:
//!
//! * **Registration errors** ([`RegistrationError`]) are produced while an
//!   operation is being added to an [`ApiDescription`](crate::ApiDescription).
//!   They indicate malformed operation metadata (a descriptor with no matching
//!   handler argument, more than one request-body argument, and so on) and are
//!   expected to abort server startup: an operation that fails to register is
//!   never added to the registry, so there is no partial or degraded state.
//!
//! * **Request-time errors** ([`HttpError`]) are produced while handling a
//!   single request.  Every one of them is converted into exactly one HTTP
//!   response at the dispatch layer; none propagates further.  An `HttpError`
//!   carries both an external message (sent to the client) and an internal
//!   message (logged), which may differ: a client whose request failed because
//!   of a server bug sees "Internal Server Error" while the log records the
//!   specific fault.
//!
//! The wire shape for all failure responses is [`ErrorModel`]: a `message`
//! plus optional structured `detail`.  This shape is stable regardless of
//! which internal path produced the error.

use crate::http_util::CONTENT_TYPE_JSON;
use crate::http_util::HEADER_REQUEST_ID;
use http::StatusCode;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use std::error::Error;
use std::fmt;

/// Body of an HTTP response for a failed request.
///
/// This is the uniform error shape used for every failure response the server
/// produces, whether it came from the binder (bad parameter), the decoder
/// (malformed body), the handler itself (an explicitly returned error-role
/// value), or a last-resort internal error.  Handlers that want to report
/// failures construct one of these and return it in their error-role slot.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct ErrorModel {
    /// human-readable summary of the failure
    pub message: String,
    /// optional structured detail about the failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl ErrorModel {
    pub fn new<S: ToString>(message: S) -> Self {
        ErrorModel { message: message.to_string(), detail: None }
    }

    pub fn with_detail<S: ToString>(
        message: S,
        detail: serde_json::Value,
    ) -> Self {
        ErrorModel { message: message.to_string(), detail: Some(detail) }
    }
}

/// `HttpError` represents an error generated as part of handling an API
/// request.  When these bubble up to the top of the request handling stack,
/// they are turned into an HTTP response whose body is an [`ErrorModel`].
///
/// The external message is sent to the client; the internal message is
/// recorded in the log.  For most 400-level errors there's no need for the
/// two to differ.  For 500-level errors, the external message is generic and
/// the internal message carries the specifics.
#[derive(Debug)]
pub struct HttpError {
    /// HTTP status code for this error
    pub status_code: StatusCode,
    /// error message to be sent to the API client
    pub external_message: String,
    /// error message recorded in the log
    pub internal_message: String,
}

impl HttpError {
    /// Generates a 400 "Bad Request" error with the given `message` used for
    /// both the internal and external message.
    pub fn for_bad_request(message: String) -> Self {
        HttpError::for_client_error(StatusCode::BAD_REQUEST, message)
    }

    /// Generates an `HttpError` for any 400-level client error with a custom
    /// `message` used for both the internal and external message.
    pub fn for_client_error(status_code: StatusCode, message: String) -> Self {
        assert!(status_code.is_client_error());
        HttpError {
            status_code,
            internal_message: message.clone(),
            external_message: message,
        }
    }

    /// Generates an `HttpError` for a 500 "Internal Server Error" with the
    /// given `internal_message`.  The external message is the generic status
    /// label so that internal details never leak to clients.
    pub fn for_internal_error(internal_message: String) -> Self {
        let status_code = StatusCode::INTERNAL_SERVER_ERROR;
        HttpError {
            status_code,
            external_message: status_code
                .canonical_reason()
                .unwrap()
                .to_string(),
            internal_message,
        }
    }

    /// Generates an `HttpError` for a 404 "Not Found" error with a custom
    /// internal message.  The external message will be "Not Found".
    pub fn for_not_found(internal_message: String) -> Self {
        let status_code = StatusCode::NOT_FOUND;
        HttpError {
            status_code,
            external_message: status_code
                .canonical_reason()
                .unwrap()
                .to_string(),
            internal_message,
        }
    }

    /// Generates an HTTP response for this error, using `request_id` for the
    /// response's request id header.
    pub fn into_response(
        self,
        request_id: &str,
    ) -> hyper::Response<crate::Body> {
        let body = ErrorModel::new(self.external_message);
        // Serializing an ErrorModel cannot fail: it's a struct of plain
        // strings and an optional pre-built JSON value.
        let mut serialized = serde_json::to_string(&body).unwrap();
        serialized.push('\n');
        hyper::Response::builder()
            .status(self.status_code)
            .header(http::header::CONTENT_TYPE, CONTENT_TYPE_JSON)
            .header(HEADER_REQUEST_ID, request_id)
            .body(serialized.into())
            .unwrap()
    }
}

impl From<http::Error> for HttpError {
    fn from(error: http::Error) -> Self {
        HttpError::for_internal_error(format!(
            "error assembling response: {}",
            error
        ))
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HttpError({}): {}", self.status_code, self.external_message)
    }
}

impl Error for HttpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

/// Errors produced while registering an operation.
///
/// These are all fatal to the registration: the operation is not added to the
/// registry and the caller is expected to treat the failure as a startup
/// error.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("operation \"{operation_id}\" has no handler")]
    MissingHandler { operation_id: String },

    #[error(
        "parameter \"{name}\" has no corresponding handler argument position"
    )]
    UnconsumedDescriptor { name: String },

    #[error(
        "handler argument {position} has no parameter descriptor and is not \
         a request body"
    )]
    UnboundArgument { position: usize },

    #[error(
        "parameter \"{name}\" is bound to request-body argument {position}"
    )]
    DescriptorOnBodyArgument { name: String, position: usize },

    #[error("only one request-body argument can be used in a handler")]
    MultipleBodyArguments,

    #[error("path parameter \"{name}\" cannot be optional")]
    OptionalPathParameter { name: String },

    #[error("request-body argument {position} cannot be optional")]
    OptionalBodyArgument { position: usize },

    #[error("path parameters are not consumed ({names})")]
    PathParametersNotConsumed { names: String },

    #[error("specified parameters do not appear in the path ({names})")]
    ParametersNotInPath { names: String },

    #[error(
        "the parameter \"{name}\" is specified for both query and path \
         parameters"
    )]
    QueryShadowsPathParameter { name: String },

    #[error("invalid path template \"{path}\": {reason}")]
    InvalidPathTemplate { path: String, reason: String },

    #[error("URI path \"{path}\": {reason}")]
    RouteConflict { path: String, reason: String },

    #[error("duplicate route for method \"{method}\" of path \"{path}\"")]
    DuplicateRoute { method: String, path: String },
}

#[cfg(test)]
mod test {
    use super::ErrorModel;

    #[test]
    fn test_serialize_error_model() {
        let err = ErrorModel::new("oy!");
        let out = serde_json::to_string(&err).unwrap();
        assert_eq!(out, r#"{"message":"oy!"}"#);

        let err = ErrorModel::with_detail(
            "value not allowed",
            serde_json::json!({ "field": "word" }),
        );
        let out = serde_json::to_string(&err).unwrap();
        assert_eq!(
            out,
            r#"{"message":"value not allowed","detail":{"field":"word"}}"#
        );
    }

    #[test]
    fn test_deserialize_error_model() {
        let err: ErrorModel =
            serde_json::from_str(r#"{"message":"nope"}"#).unwrap();
        assert_eq!(err.message, "nope");
        assert!(err.detail.is_none());
    }
}
