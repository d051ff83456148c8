//! Argument binding: classifying handler arguments at registration time and
//! materializing them from a request at dispatch time.
//!
//! The two halves live on the same trait ([`HandlerArg`]) so that they can
//! never disagree about an argument's shape.  `plan()` runs once, when the
//! operation is registered, and pairs the argument's position with its
//! parameter descriptor (or classifies it as the request body); the result is
//! an [`ArgRule`], one entry of the operation's binding plan.  `bind()` runs
//! on every request, replaying the rule: fetch the raw string (path capture
//! or query value), strictly parse it into the declared type, or decode the
//! request body.  A parse or decode failure produces a 400 and the handler is
//! never invoked.
//!
//! The set of implementations is deliberately closed: scalars
//! (`String`/`bool`/integers/floats) bind from path or query strings,
//! `Option<T>` of a query scalar binds as not-required, and [`TypedBody<T>`]
//! binds from the decoded request payload.  There is no runtime type
//! inspection on the hot path; everything is selected here, once.

use crate::api_description::Param;
use crate::api_description::ParamSource;
use crate::error::HttpError;
use crate::error::RegistrationError;
use crate::handler::RequestContext;
use crate::schema_util::SchemaSource;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

/// One entry of an operation's binding plan: how to obtain the argument at
/// the corresponding position.  Built once at registration time, replayed on
/// every request, never mutated.
#[derive(Debug, Clone)]
pub enum ArgRule {
    /// bind from the named path capture
    Path { name: String },
    /// bind from the named query string value
    Query { name: String },
    /// decode from the request payload
    Body,
}

/// Everything `plan()` produces for one argument position: the runtime rule
/// plus the metadata the schema synthesizer needs.
#[derive(Debug)]
pub struct ArgPlan {
    pub rule: ArgRule,
    /// present for path/query arguments
    pub parameter: Option<ParameterMeta>,
    /// present for the request-body argument
    pub body_schema: Option<SchemaSource>,
}

/// Metadata describing one path or query parameter, with the value type
/// inferred from the handler argument rather than declared separately.
#[derive(Debug)]
pub struct ParameterMeta {
    pub name: String,
    pub source: ParamSource,
    pub description: Option<String>,
    pub required: bool,
    pub schema: SchemaSource,
}

/// Implemented by every type that can appear as a handler argument.
///
/// Consumers don't implement this; the implementations below form the closed
/// vocabulary of supported argument shapes.
#[async_trait]
pub trait HandlerArg: Send + Sized + 'static {
    /// Registration-time half: classify this argument given the parameter
    /// descriptor paired with its position (if any).
    fn plan(
        position: usize,
        param: Option<&Param>,
    ) -> Result<ArgPlan, RegistrationError>;

    /// Request-time half: materialize the argument by replaying `rule`.
    async fn bind(
        rule: &ArgRule,
        rqctx: &mut RequestContext,
    ) -> Result<Self, HttpError>;
}

macro_rules! impl_handler_arg_for_scalar {
    ($($t:ty),*) => { $(
        #[async_trait]
        impl HandlerArg for $t {
            fn plan(
                position: usize,
                param: Option<&Param>,
            ) -> Result<ArgPlan, RegistrationError> {
                let param = param.ok_or(
                    RegistrationError::UnboundArgument { position },
                )?;
                let rule = match param.source {
                    ParamSource::Path => {
                        ArgRule::Path { name: param.name.clone() }
                    }
                    ParamSource::Query => {
                        ArgRule::Query { name: param.name.clone() }
                    }
                };
                Ok(ArgPlan {
                    rule,
                    parameter: Some(ParameterMeta {
                        name: param.name.clone(),
                        source: param.source,
                        description: param.description.clone(),
                        required: true,
                        schema: SchemaSource::static_for::<$t>(),
                    }),
                    body_schema: None,
                })
            }

            async fn bind(
                rule: &ArgRule,
                rqctx: &mut RequestContext,
            ) -> Result<Self, HttpError> {
                let (name, raw) = match rule {
                    ArgRule::Path { name } => {
                        (name, rqctx.path_variable(name)?)
                    }
                    ArgRule::Query { name } => {
                        let raw = rqctx.query_value(name).ok_or_else(|| {
                            HttpError::for_bad_request(format!(
                                "missing required query parameter \"{}\"",
                                name
                            ))
                        })?;
                        (name, raw)
                    }
                    // plan() never pairs a scalar with a body rule
                    ArgRule::Body => {
                        return Err(HttpError::for_internal_error(
                            "scalar argument bound to body rule".to_string(),
                        ))
                    }
                };
                raw.parse::<$t>().map_err(|_| {
                    HttpError::for_bad_request(format!(
                        "unable to parse value for parameter \"{}\"",
                        name
                    ))
                })
            }
        }
    )* }
}

impl_handler_arg_for_scalar!(
    String, bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64
);

// An `Option` argument is the explicit "may be absent" form: the inner
// binding is unchanged, but a missing query value binds as `None` instead of
// failing.  A *present* value that fails to parse is still a 400; optionality
// never launders bad input.  Path captures are always present, so an optional
// path parameter is rejected at registration time.
#[async_trait]
impl<T: HandlerArg> HandlerArg for Option<T> {
    fn plan(
        position: usize,
        param: Option<&Param>,
    ) -> Result<ArgPlan, RegistrationError> {
        let mut plan = T::plan(position, param)?;
        match &plan.rule {
            ArgRule::Query { .. } => {}
            ArgRule::Path { name } => {
                return Err(RegistrationError::OptionalPathParameter {
                    name: name.clone(),
                })
            }
            ArgRule::Body => {
                return Err(RegistrationError::OptionalBodyArgument {
                    position,
                })
            }
        }
        if let Some(meta) = plan.parameter.as_mut() {
            meta.required = false;
        }
        Ok(plan)
    }

    async fn bind(
        rule: &ArgRule,
        rqctx: &mut RequestContext,
    ) -> Result<Self, HttpError> {
        if let ArgRule::Query { name } = rule {
            if rqctx.query_value(name).is_none() {
                return Ok(None);
            }
        }
        T::bind(rule, rqctx).await.map(Some)
    }
}

/// `TypedBody<BodyType>` is the request-body argument: an instance of
/// `BodyType` deserialized from the request's JSON payload.  `BodyType` may
/// be any of your structs that implements [`serde::Deserialize`] and
/// [`schemars::JsonSchema`].  Unknown fields in the payload are tolerated; a
/// field whose JSON value doesn't match the declared field type rejects the
/// request with a 400 before the handler runs.
#[derive(Debug)]
pub struct TypedBody<BodyType: JsonSchema + DeserializeOwned + Send + Sync> {
    inner: BodyType,
}

impl<BodyType: JsonSchema + DeserializeOwned + Send + Sync>
    TypedBody<BodyType>
{
    pub fn into_inner(self) -> BodyType {
        self.inner
    }
}

#[async_trait]
impl<BodyType> HandlerArg for TypedBody<BodyType>
where
    BodyType: JsonSchema + DeserializeOwned + Send + Sync + 'static,
{
    fn plan(
        position: usize,
        param: Option<&Param>,
    ) -> Result<ArgPlan, RegistrationError> {
        // The body argument is identified by *not* having a descriptor.  A
        // descriptor paired with this position indicates the registration's
        // parameter list and the handler's signature disagree.
        if let Some(param) = param {
            return Err(RegistrationError::DescriptorOnBodyArgument {
                name: param.name.clone(),
                position,
            });
        }
        Ok(ArgPlan {
            rule: ArgRule::Body,
            parameter: None,
            body_schema: Some(SchemaSource::generated_for::<BodyType>()),
        })
    }

    async fn bind(
        _rule: &ArgRule,
        rqctx: &mut RequestContext,
    ) -> Result<Self, HttpError> {
        rqctx.require_json_content_type()?;
        let body = rqctx.take_body_bytes().await?;
        let jd = &mut serde_json::Deserializer::from_slice(&body);
        let inner = serde_path_to_error::deserialize(jd).map_err(|e| {
            HttpError::for_bad_request(format!(
                "unable to parse JSON body: {}",
                e
            ))
        })?;
        Ok(TypedBody { inner })
    }
}

/// Everything the argument half of signature analysis produces for an
/// operation: the ordered binding rules plus the metadata mirrored into the
/// schema document.
#[derive(Debug)]
pub struct SignatureInputs {
    pub rules: Vec<ArgRule>,
    pub parameters: Vec<ParameterMeta>,
    pub body_schema: Option<SchemaSource>,
}

/// Implemented for tuples of [`HandlerArg`] types; this is the form in which
/// a handler's full argument list is analyzed and bound.
#[async_trait]
pub trait ArgSet: Send + Sized + 'static {
    /// Pair each argument position with its parameter descriptor and build
    /// the operation's argument rules, or fail with a registration error.
    fn plan(params: &[Param]) -> Result<SignatureInputs, RegistrationError>;

    /// Bind every argument, in order, by replaying `rules`.
    async fn bind(
        rules: &[ArgRule],
        rqctx: &mut RequestContext,
    ) -> Result<Self, HttpError>;
}

macro_rules! impl_arg_set_for_tuple {
    ($(($i:tt, $A:ident)),*) => {
        #[async_trait]
        impl<$($A: HandlerArg,)*> ArgSet for ($($A,)*) {
            #[allow(unused_mut, unused_variables, unused_assignments)]
            fn plan(
                params: &[Param],
            ) -> Result<SignatureInputs, RegistrationError> {
                let argument_types: &[&str] = &[$(stringify!($A)),*];
                let arity = argument_types.len();
                // Descriptors pair positionally with the leading arguments;
                // one left over means it references a position the handler
                // doesn't have.
                if params.len() > arity {
                    return Err(RegistrationError::UnconsumedDescriptor {
                        name: params[arity].name.clone(),
                    });
                }

                let mut rules = Vec::with_capacity(arity);
                let mut parameters = Vec::new();
                let mut body_schema = None;
                let mut position = 0;
                $(
                    let plan =
                        <$A as HandlerArg>::plan(position, params.get(position))?;
                    if let Some(meta) = plan.parameter {
                        parameters.push(meta);
                    }
                    if let Some(schema) = plan.body_schema {
                        if body_schema.is_some() {
                            return Err(
                                RegistrationError::MultipleBodyArguments,
                            );
                        }
                        body_schema = Some(schema);
                    }
                    rules.push(plan.rule);
                    position += 1;
                )*

                Ok(SignatureInputs { rules, parameters, body_schema })
            }

            #[allow(unused_variables)]
            async fn bind(
                rules: &[ArgRule],
                rqctx: &mut RequestContext,
            ) -> Result<Self, HttpError> {
                Ok(($(<$A as HandlerArg>::bind(&rules[$i], rqctx).await?,)*))
            }
        }
    };
}

impl_arg_set_for_tuple!();
impl_arg_set_for_tuple!((0, A0));
impl_arg_set_for_tuple!((0, A0), (1, A1));
impl_arg_set_for_tuple!((0, A0), (1, A1), (2, A2));
impl_arg_set_for_tuple!((0, A0), (1, A1), (2, A2), (3, A3));
