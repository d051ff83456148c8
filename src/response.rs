//! Response interpretation: classifying handler return values at registration
//! time and serializing them at dispatch time.
//!
//! A handler's first return value is always the HTTP status code, written to
//! the response verbatim.  It may be followed by a body-role value and,
//! optionally, an error-role value:
//!
//! * `StatusCode` — status only, empty body
//! * `(StatusCode, B)` — status plus body
//! * `(StatusCode, B, Option<ErrorModel>)` — status plus body plus an
//!   error-role slot; when the slot is `Some`, the error takes priority and
//!   the body-role value is skipped entirely
//!
//! where `B` is any [`ResponsePayload`]: a scalar (`String`, `bool`,
//! integers, floats), a [`Json<T>`] wrapper around a serializable struct, or
//! an `Option` of either (the "pointer-shaped" output: `None` means no body).
//!
//! Scalar payloads render both a text form and a JSON form up front; which
//! one goes on the wire depends on the content kind of the response
//! descriptor matching the returned status.  A text-kind scalar is written as
//! its literal token with no trailing newline — `false` renders as the
//! four characters `false`, never as an empty body.  Everything else is
//! written as JSON with a trailing newline.

use crate::api_description::ContentKind;
use crate::error::ErrorModel;
use crate::error::HttpError;
use crate::http_util::CONTENT_TYPE_JSON;
use crate::http_util::CONTENT_TYPE_TEXT;
use crate::schema_util::SchemaSource;
use http::StatusCode;
use hyper::Response;
use schemars::JsonSchema;
use serde::Serialize;

/// Whether a body-role value is a scalar or a composite, decided once at
/// registration time from the declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Scalar,
    Structured,
}

/// A body-role value after the handler has returned, rendered into bytes but
/// not yet committed to a wire encoding.  Scalars carry both renderings; the
/// serializer picks one based on the matching response descriptor.
#[derive(Debug)]
pub enum Payload {
    Scalar { text: String, json: String },
    Structured { json: String },
}

/// The transient result of one handler invocation, consumed immediately by
/// the serializer.
#[derive(Debug)]
pub struct ResponseEnvelope {
    pub status: StatusCode,
    pub payload: Option<Payload>,
    pub error: Option<ErrorModel>,
}

/// Implemented by every type that can appear in a handler's body-role return
/// position.  Like the argument side, this is a closed vocabulary.
pub trait ResponsePayload: Send + 'static {
    fn shape() -> PayloadShape;
    fn schema() -> Option<SchemaSource>;
    fn into_payload(self) -> Result<Option<Payload>, HttpError>;
}

macro_rules! impl_response_payload_for_scalar {
    ($($t:ty),*) => { $(
        impl ResponsePayload for $t {
            fn shape() -> PayloadShape {
                PayloadShape::Scalar
            }

            fn schema() -> Option<SchemaSource> {
                Some(SchemaSource::static_for::<$t>())
            }

            fn into_payload(self) -> Result<Option<Payload>, HttpError> {
                let json = serde_json::to_string(&self).map_err(|e| {
                    HttpError::for_internal_error(format!(
                        "error serializing response: {}",
                        e
                    ))
                })?;
                Ok(Some(Payload::Scalar { text: self.to_string(), json }))
            }
        }
    )* }
}

impl_response_payload_for_scalar!(
    String, bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64
);

/// `Json<T>` wraps a serializable value to mark it as a structured response
/// body.  `T` may be any of your types that implements [`serde::Serialize`]
/// and [`schemars::JsonSchema`]; its schema lands in the API description's
/// components section.
#[derive(Debug)]
pub struct Json<T: Serialize + JsonSchema + Send + 'static>(pub T);

impl<T: Serialize + JsonSchema + Send + 'static> ResponsePayload for Json<T> {
    fn shape() -> PayloadShape {
        PayloadShape::Structured
    }

    fn schema() -> Option<SchemaSource> {
        Some(SchemaSource::generated_for::<T>())
    }

    fn into_payload(self) -> Result<Option<Payload>, HttpError> {
        let json = serde_json::to_string(&self.0).map_err(|e| {
            HttpError::for_internal_error(format!(
                "error serializing response: {}",
                e
            ))
        })?;
        Ok(Some(Payload::Structured { json }))
    }
}

// The pointer-shaped output: a single return slot that doubles as a presence
// flag.  `None` serializes to no body at all.
impl<T: ResponsePayload> ResponsePayload for Option<T> {
    fn shape() -> PayloadShape {
        T::shape()
    }

    fn schema() -> Option<SchemaSource> {
        T::schema()
    }

    fn into_payload(self) -> Result<Option<Payload>, HttpError> {
        match self {
            None => Ok(None),
            Some(value) => value.into_payload(),
        }
    }
}

/// Registration-time description of a handler's body-role output.
#[derive(Debug, Clone)]
pub struct PayloadRule {
    pub shape: PayloadShape,
    pub schema: Option<SchemaSource>,
}

/// Registration-time description of a handler's full return shape.
#[derive(Debug)]
pub struct ResultRules {
    /// `None` for status-only handlers
    pub payload: Option<PayloadRule>,
    /// whether the handler declares a trailing error-role slot
    pub error_slot: bool,
}

/// Implemented by every supported handler return shape.
pub trait HandlerResult: Send + 'static {
    fn rules() -> ResultRules;
    fn into_envelope(self) -> Result<ResponseEnvelope, HttpError>;
}

impl HandlerResult for StatusCode {
    fn rules() -> ResultRules {
        ResultRules { payload: None, error_slot: false }
    }

    fn into_envelope(self) -> Result<ResponseEnvelope, HttpError> {
        Ok(ResponseEnvelope { status: self, payload: None, error: None })
    }
}

impl<B: ResponsePayload> HandlerResult for (StatusCode, B) {
    fn rules() -> ResultRules {
        ResultRules {
            payload: Some(PayloadRule {
                shape: B::shape(),
                schema: B::schema(),
            }),
            error_slot: false,
        }
    }

    fn into_envelope(self) -> Result<ResponseEnvelope, HttpError> {
        let (status, body) = self;
        Ok(ResponseEnvelope {
            status,
            payload: body.into_payload()?,
            error: None,
        })
    }
}

impl<B: ResponsePayload> HandlerResult for (StatusCode, B, Option<ErrorModel>) {
    fn rules() -> ResultRules {
        ResultRules {
            payload: Some(PayloadRule {
                shape: B::shape(),
                schema: B::schema(),
            }),
            error_slot: true,
        }
    }

    fn into_envelope(self) -> Result<ResponseEnvelope, HttpError> {
        let (status, body, error) = self;
        // When the error-role slot is occupied, the body-role value is
        // skipped entirely (not even serialized).
        let payload =
            if error.is_some() { None } else { body.into_payload()? };
        Ok(ResponseEnvelope { status, payload, error })
    }
}

/// One entry of an operation's serialization plan: the declared content kind
/// for a given status code.
#[derive(Debug, Clone)]
pub(crate) struct ResponseRule {
    pub status: StatusCode,
    pub kind: ContentKind,
}

/// Convert a handler's envelope into the concrete response, choosing text
/// vs. structured encoding from the value's shape and the response descriptor
/// matching the returned status.  Structured bodies are newline-terminated;
/// text bodies are not.
pub(crate) fn serialize_response(
    envelope: ResponseEnvelope,
    rules: &[ResponseRule],
) -> Result<Response<crate::Body>, HttpError> {
    let status = envelope.status;

    // A non-absent error-role value takes priority over the body-role value
    // and is always structured.
    if let Some(error) = envelope.error {
        let json = serde_json::to_string(&error).map_err(|e| {
            HttpError::for_internal_error(format!(
                "error serializing error model: {}",
                e
            ))
        })?;
        return json_response(status, json);
    }

    let kind = rules
        .iter()
        .find(|rule| rule.status == status)
        .map(|rule| rule.kind)
        .unwrap_or(ContentKind::Json);

    match envelope.payload {
        None => Ok(Response::builder()
            .status(status)
            .body(crate::Body::empty())?),
        Some(Payload::Scalar { text, .. }) if kind == ContentKind::Text => {
            Ok(Response::builder()
                .status(status)
                .header(http::header::CONTENT_TYPE, CONTENT_TYPE_TEXT)
                .body(text.into())?)
        }
        Some(Payload::Scalar { json, .. })
        | Some(Payload::Structured { json }) => json_response(status, json),
    }
}

fn json_response(
    status: StatusCode,
    mut json: String,
) -> Result<Response<crate::Body>, HttpError> {
    json.push('\n');
    Ok(Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, CONTENT_TYPE_JSON)
        .body(json.into())?)
}

#[cfg(test)]
mod test {
    use super::serialize_response;
    use super::HandlerResult;
    use super::Payload;
    use super::PayloadShape;
    use super::ResponsePayload;
    use super::ResponseRule;
    use crate::api_description::ContentKind;
    use crate::error::ErrorModel;
    use crate::Json;
    use http::StatusCode;
    use http_body_util::BodyExt;
    use schemars::JsonSchema;
    use serde::Serialize;

    async fn body_string(
        response: hyper::Response<crate::Body>,
    ) -> (StatusCode, String) {
        let status = response.status();
        let bytes =
            response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn text_rule(status: StatusCode) -> Vec<ResponseRule> {
        vec![ResponseRule { status, kind: ContentKind::Text }]
    }

    #[tokio::test]
    async fn test_scalar_false_renders_literal_token() {
        // A present-but-falsy scalar must render its literal text form, not
        // an empty body.
        let envelope = (StatusCode::OK, Some(false))
            .into_envelope()
            .unwrap();
        let response =
            serialize_response(envelope, &text_rule(StatusCode::OK)).unwrap();
        let (status, body) = body_string(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "false");
    }

    #[tokio::test]
    async fn test_text_body_has_no_trailing_newline() {
        let envelope =
            (StatusCode::OK, "hello".to_string()).into_envelope().unwrap();
        let response =
            serialize_response(envelope, &text_rule(StatusCode::OK)).unwrap();
        let (_, body) = body_string(response).await;
        assert_eq!(body, "hello");
    }

    #[derive(Serialize, JsonSchema)]
    struct TestResponse {
        value: String,
    }

    #[tokio::test]
    async fn test_structured_body_is_newline_terminated() {
        let envelope = (
            StatusCode::OK,
            Json(TestResponse { value: "world".to_string() }),
        )
            .into_envelope()
            .unwrap();
        let rules = vec![ResponseRule {
            status: StatusCode::OK,
            kind: ContentKind::Json,
        }];
        let response = serialize_response(envelope, &rules).unwrap();
        let (_, body) = body_string(response).await;
        assert_eq!(body, "{\"value\":\"world\"}\n");
    }

    #[tokio::test]
    async fn test_absent_body_serializes_to_no_body() {
        let envelope = (StatusCode::CREATED, Option::<Json<TestResponse>>::None)
            .into_envelope()
            .unwrap();
        let response = serialize_response(envelope, &[]).unwrap();
        let (status, body) = body_string(response).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, "");
    }

    #[tokio::test]
    async fn test_error_slot_overrides_body() {
        let envelope = (
            StatusCode::BAD_REQUEST,
            Some(Json(TestResponse { value: "ignored".to_string() })),
            Some(ErrorModel::new("value not allowed")),
        )
            .into_envelope()
            .unwrap();
        assert!(envelope.payload.is_none());
        let response = serialize_response(envelope, &[]).unwrap();
        let (status, body) = body_string(response).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "{\"message\":\"value not allowed\"}\n");
    }

    #[tokio::test]
    async fn test_scalar_with_json_descriptor_encodes_as_json() {
        let envelope =
            (StatusCode::OK, "hello".to_string()).into_envelope().unwrap();
        let rules = vec![ResponseRule {
            status: StatusCode::OK,
            kind: ContentKind::Json,
        }];
        let response = serialize_response(envelope, &rules).unwrap();
        let (_, body) = body_string(response).await;
        assert_eq!(body, "\"hello\"\n");
    }

    #[test]
    fn test_shapes() {
        assert_eq!(<Option<bool>>::shape(), PayloadShape::Scalar);
        assert_eq!(<Json<TestResponse>>::shape(), PayloadShape::Structured);
        assert_eq!(String::shape(), PayloadShape::Scalar);
    }

    #[test]
    fn test_status_only_handlers_have_no_payload() {
        let rules = StatusCode::rules();
        assert!(rules.payload.is_none());
        assert!(!rules.error_slot);

        let envelope = StatusCode::NO_CONTENT.into_envelope().unwrap();
        assert!(envelope.payload.is_none());
        assert!(envelope.error.is_none());
    }

    #[test]
    fn test_scalar_payload_carries_both_renderings() {
        let payload = 0u32.into_payload().unwrap().unwrap();
        let Payload::Scalar { text, json } = payload else {
            panic!("expected scalar payload");
        };
        assert_eq!(text, "0");
        assert_eq!(json, "0");
    }
}
