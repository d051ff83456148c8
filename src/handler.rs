//! Interface for implementing HTTP operation handler functions.
//!
//! A handler is a plain async function over already-validated inputs: it
//! performs no request parsing, no response encoding, and no I/O framing.
//! We allow for variation in the function arguments not so much for
//! programmer convenience but so that the type signature of the handler can
//! be analyzed at registration time: the same type information drives both
//! the per-request binding plan and the generated OpenAPI description, which
//! means the implementation cannot diverge from the published schema.
//!
//! There are several layers of traits here, all in service of treating
//! functions with different signatures uniformly:
//!
//! * [`HandlerFn`] is implemented (via a macro, once per supported arity) for
//!   any async function whose arguments form an
//!   [`ArgSet`](crate::binding::ArgSet) and whose return value is a
//!   [`HandlerResult`](crate::response::HandlerResult).
//! * `UnboundHandler` erases the function's type so an
//!   [`Operation`](crate::Operation) can carry it before registration.  At
//!   registration time, `analyze()` runs the signature analysis against the
//!   operation's descriptors and produces the binding plan.
//! * `RouteHandler` is the fully-bound form stored in the router: handler
//!   plus plan, invocable per request without knowing the signature.
//!
//! The per-request hot path — `OperationHandler::handle_request()` — replays
//! the plan: bind each argument, invoke the function, interpret the outputs,
//! serialize.  Any classified failure (bad parameter, undecodable body)
//! becomes a 400 before the handler runs; a panic anywhere in the sequence is
//! caught and becomes a 500 with a generic message.

use crate::binding::ArgRule;
use crate::binding::ArgSet;
use crate::binding::ParameterMeta;
use crate::error::HttpError;
use crate::error::RegistrationError;
use crate::http_util::media_type_of;
use crate::http_util::CONTENT_TYPE_JSON;
use crate::response::serialize_response;
use crate::response::HandlerResult;
use crate::response::PayloadRule;
use crate::response::ResponseRule;
use crate::router::VariableSet;
use crate::schema_util::SchemaSource;
use crate::Param;

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use http_body_util::BodyExt;
use hyper::Response;
use slog::Logger;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;

/// Per-request state owned by the dispatcher for the duration of one request
/// and discarded once the response is written: the raw request pieces, the
/// matched path captures, and the not-yet-consumed body.
#[derive(Debug)]
pub struct RequestContext {
    /// unique id assigned to this request
    pub request_id: String,
    /// logger for this specific request
    pub log: Logger,

    pub(crate) head: http::request::Parts,
    pub(crate) path_variables: VariableSet,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Option<crate::Body>,
    pub(crate) request_body_max_bytes: usize,
}

impl RequestContext {
    pub(crate) fn new(
        request: hyper::Request<crate::Body>,
        path_variables: VariableSet,
        request_id: String,
        log: Logger,
        request_body_max_bytes: usize,
    ) -> RequestContext {
        let (head, body) = request.into_parts();
        let query = head
            .uri
            .query()
            .map(|raw| {
                form_urlencoded::parse(raw.as_bytes()).into_owned().collect()
            })
            .unwrap_or_default();
        RequestContext {
            request_id,
            log,
            head,
            path_variables,
            query,
            body: Some(body),
            request_body_max_bytes,
        }
    }

    /// Returns the path capture for `name`.  The router only dispatches to an
    /// operation after assigning all of its path variables, so a miss here
    /// means the request doesn't actually carry the parameter.
    pub(crate) fn path_variable(
        &self,
        name: &str,
    ) -> Result<String, HttpError> {
        self.path_variables.get(name).cloned().ok_or_else(|| {
            HttpError::for_bad_request(format!(
                "missing value for path parameter \"{}\"",
                name
            ))
        })
    }

    /// Returns the first query-string value for `name`, if present.
    pub(crate) fn query_value(&self, name: &str) -> Option<String> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    /// Rejects requests whose `Content-Type` names something other than JSON.
    /// A missing `Content-Type` is assumed to be JSON.
    pub(crate) fn require_json_content_type(&self) -> Result<(), HttpError> {
        let header = match self.head.headers.get(http::header::CONTENT_TYPE) {
            None => return Ok(()),
            Some(value) => value.to_str().map_err(|e| {
                HttpError::for_bad_request(format!(
                    "invalid content type: {}",
                    e
                ))
            })?,
        };
        let mime_type = media_type_of(header);
        if mime_type != CONTENT_TYPE_JSON {
            return Err(HttpError::for_bad_request(format!(
                "expected content type \"{}\", got \"{}\"",
                CONTENT_TYPE_JSON, mime_type
            )));
        }
        Ok(())
    }

    /// Buffers the request body, applying the configured size cap.
    pub(crate) async fn take_body_bytes(
        &mut self,
    ) -> Result<Bytes, HttpError> {
        let body = self.body.take().ok_or_else(|| {
            HttpError::for_internal_error(
                "request body already consumed".to_string(),
            )
        })?;
        let limited =
            http_body_util::Limited::new(body, self.request_body_max_bytes);
        let collected = limited.collect().await.map_err(|error| {
            if error.downcast_ref::<http_body_util::LengthLimitError>().is_some()
            {
                HttpError::for_bad_request(format!(
                    "request body exceeded maximum size of {} bytes",
                    self.request_body_max_bytes
                ))
            } else {
                HttpError::for_bad_request(format!(
                    "error reading request body: {}",
                    error
                ))
            }
        })?;
        Ok(collected.to_bytes())
    }

    #[cfg(test)]
    pub(crate) fn for_test(
        uri: &str,
        body: Option<crate::Body>,
    ) -> RequestContext {
        let request = hyper::Request::builder()
            .uri(uri)
            .body(body.unwrap_or_default())
            .unwrap();
        RequestContext::new(
            request,
            VariableSet::new(),
            "test-request".to_string(),
            Logger::root(slog::Discard, o!()),
            1024,
        )
    }
}

/// `HandlerFn` is implemented for any async function matching one of the
/// supported operation handler signatures: zero to four
/// [`HandlerArg`](crate::binding::HandlerArg) arguments and a
/// [`HandlerResult`] return value.
///
/// The `ArgTuple` type parameter is a tuple describing the function's
/// arguments.  Since the signature shows up only in that type parameter,
/// additional erasure (below) lets callers treat different handlers
/// interchangeably.
#[async_trait]
pub trait HandlerFn<ArgTuple, Ret>: Send + Sync + 'static
where
    ArgTuple: ArgSet,
    Ret: HandlerResult,
{
    async fn handle(&self, args: ArgTuple) -> Ret;
}

// Defines an implementation of `HandlerFn` for functions of each supported
// arity.  The implementation unpacks the argument tuple into actual function
// arguments and awaits the function's future; everything here resolves
// statically.
macro_rules! impl_handler_fn_for_arity {
    ($($A:ident),*) => {
        #[async_trait]
        impl<FuncType, FutureType, Ret, $($A,)*> HandlerFn<($($A,)*), Ret>
            for FuncType
        where
            FuncType: Fn($($A,)*) -> FutureType + Send + Sync + 'static,
            FutureType: Future<Output = Ret> + Send + 'static,
            Ret: HandlerResult,
            ($($A,)*): ArgSet,
            $($A: Send + 'static,)*
        {
            async fn handle(&self, args: ($($A,)*)) -> Ret {
                #[allow(non_snake_case)]
                let ($($A,)*) = args;
                (self)($($A,)*).await
            }
        }
    };
}

impl_handler_fn_for_arity!();
impl_handler_fn_for_arity!(A0);
impl_handler_fn_for_arity!(A0, A1);
impl_handler_fn_for_arity!(A0, A1, A2);
impl_handler_fn_for_arity!(A0, A1, A2, A3);

/// The immutable per-operation recipe replayed on every request: the ordered
/// argument rules produced by signature analysis plus the declared response
/// descriptors the serializer consults.  Built once at registration time,
/// never mutated afterwards, so it's safe to share across concurrent
/// requests by construction.
#[derive(Debug)]
pub(crate) struct BindingPlan {
    pub args: Vec<ArgRule>,
    pub responses: Vec<ResponseRule>,
}

/// The type-visible output of signature analysis, consumed by the registry
/// to cross-validate descriptors and to feed the schema synthesizer.
pub(crate) struct SignatureInfo {
    pub rules: Vec<ArgRule>,
    pub parameters: Vec<ParameterMeta>,
    pub body_schema: Option<SchemaSource>,
    pub payload: Option<PayloadRule>,
}

/// A handler whose signature has been captured but not yet analyzed against
/// an operation's descriptors.  `Operation` carries one of these between
/// construction and registration.
pub(crate) trait UnboundHandler: Send + Sync {
    /// Run signature analysis against the operation's parameter descriptors.
    fn analyze(
        &self,
        params: &[Param],
    ) -> Result<SignatureInfo, RegistrationError>;

    /// Consume the handler and produce the dispatchable form.
    fn bind(
        self: Box<Self>,
        label: String,
        plan: BindingPlan,
    ) -> Box<dyn RouteHandler>;
}

/// `RouteHandler` abstracts a bound handler in a way that allows the router
/// and dispatcher to invoke it without knowing its function signature.
#[async_trait]
pub(crate) trait RouteHandler: Debug + Send + Sync {
    /// Returns a debugging label for this handler (the operation id).
    fn label(&self) -> &str;

    /// Handle an incoming HTTP request.
    async fn handle_request(
        &self,
        rqctx: RequestContext,
    ) -> Result<Response<crate::Body>, HttpError>;
}

pub(crate) fn new_unbound<FuncType, ArgTuple, Ret>(
    func: FuncType,
) -> Box<dyn UnboundHandler>
where
    FuncType: HandlerFn<ArgTuple, Ret>,
    ArgTuple: ArgSet + 'static,
    Ret: HandlerResult,
{
    Box::new(UnboundHandlerImpl { func, phantom: PhantomData })
}

struct UnboundHandlerImpl<FuncType, ArgTuple, Ret>
where
    FuncType: HandlerFn<ArgTuple, Ret>,
    ArgTuple: ArgSet,
    Ret: HandlerResult,
{
    func: FuncType,
    phantom: PhantomData<fn(ArgTuple) -> Ret>,
}

impl<FuncType, ArgTuple, Ret> UnboundHandler
    for UnboundHandlerImpl<FuncType, ArgTuple, Ret>
where
    FuncType: HandlerFn<ArgTuple, Ret>,
    ArgTuple: ArgSet + 'static,
    Ret: HandlerResult,
{
    fn analyze(
        &self,
        params: &[Param],
    ) -> Result<SignatureInfo, RegistrationError> {
        let inputs = ArgTuple::plan(params)?;
        let results = Ret::rules();
        Ok(SignatureInfo {
            rules: inputs.rules,
            parameters: inputs.parameters,
            body_schema: inputs.body_schema,
            payload: results.payload,
        })
    }

    fn bind(
        self: Box<Self>,
        label: String,
        plan: BindingPlan,
    ) -> Box<dyn RouteHandler> {
        Box::new(OperationHandler {
            label,
            func: self.func,
            plan,
            phantom: PhantomData,
        })
    }
}

/// The only implementation of `RouteHandler`: a handler function paired with
/// its binding plan.  This is the runtime dispatcher's home.
struct OperationHandler<FuncType, ArgTuple, Ret>
where
    FuncType: HandlerFn<ArgTuple, Ret>,
    ArgTuple: ArgSet,
    Ret: HandlerResult,
{
    label: String,
    func: FuncType,
    plan: BindingPlan,
    phantom: PhantomData<fn(ArgTuple) -> Ret>,
}

impl<FuncType, ArgTuple, Ret> Debug
    for OperationHandler<FuncType, ArgTuple, Ret>
where
    FuncType: HandlerFn<ArgTuple, Ret>,
    ArgTuple: ArgSet,
    Ret: HandlerResult,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "handler: {}", self.label)
    }
}

#[async_trait]
impl<FuncType, ArgTuple, Ret> RouteHandler
    for OperationHandler<FuncType, ArgTuple, Ret>
where
    FuncType: HandlerFn<ArgTuple, Ret>,
    ArgTuple: ArgSet + 'static,
    Ret: HandlerResult,
{
    fn label(&self) -> &str {
        &self.label
    }

    async fn handle_request(
        &self,
        rqctx: RequestContext,
    ) -> Result<Response<crate::Body>, HttpError> {
        let log = rqctx.log.clone();
        let mut rqctx = rqctx;

        // Bind arguments per the plan, invoke the handler, interpret and
        // serialize the outputs.  Classified failures surface as `HttpError`s
        // through `?`; anything that panics instead is caught below and
        // mapped to a 500, so exactly one response is written no matter what.
        let dispatch = async {
            let args =
                ArgTuple::bind(&self.plan.args, &mut rqctx).await?;
            let ret = self.func.handle(args).await;
            let envelope = ret.into_envelope()?;
            serialize_response(envelope, &self.plan.responses)
        };

        match AssertUnwindSafe(dispatch).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                error!(log, "handler panicked"; "handler" => self.label.clone());
                Err(HttpError::for_internal_error(format!(
                    "handler \"{}\" panicked",
                    self.label
                )))
            }
        }
    }
}
