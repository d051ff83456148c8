//! Describes the operations and handler functions in your API
//!
//! An [`Operation`] couples an HTTP method and path template with declarative
//! metadata (parameter and response descriptors) and a handler function.
//! Registering it with an [`ApiDescription`] runs signature analysis once,
//! producing the binding plan the dispatcher replays per request, and feeds
//! the same type information into the OpenAPI document — the two can never
//! disagree about an operation's shape because they come from one pass over
//! one source of truth.

use crate::error::HttpError;
use crate::error::RegistrationError;
use crate::handler::new_unbound;
use crate::handler::BindingPlan;
use crate::handler::HandlerFn;
use crate::handler::RouteHandler;
use crate::handler::UnboundHandler;
use crate::binding::ArgSet;
use crate::binding::ParameterMeta;
use crate::response::HandlerResult;
use crate::response::PayloadRule;
use crate::response::ResponseRule;
use crate::router::route_path_to_segments;
use crate::router::route_path_varnames;
use crate::router::HttpRouter;
use crate::router::RouterLookupResult;
use crate::schema_util::j2oas_schema;
use crate::schema_util::SchemaSource;
use crate::http_util::CONTENT_TYPE_JSON;
use crate::ErrorModel;

use http::Method;
use http::StatusCode;
use std::collections::BTreeSet;

/// Declarative metadata for one path or query parameter of an operation.
///
/// Descriptors pair positionally with the leading arguments of the
/// operation's handler: the Nth descriptor describes the Nth argument, and
/// the argument's type determines how the raw string is parsed.  The pairing
/// is validated at registration time and any mismatch fails loudly.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub source: ParamSource,
    pub description: Option<String>,
}

impl Param {
    /// A parameter bound from the named path segment variable.
    pub fn path<N: ToString, D: ToString>(name: N, description: D) -> Param {
        Param {
            name: name.to_string(),
            source: ParamSource::Path,
            description: Some(description.to_string()),
        }
    }

    /// A parameter bound from the query string.
    pub fn query<N: ToString, D: ToString>(name: N, description: D) -> Param {
        Param {
            name: name.to_string(),
            source: ParamSource::Query,
            description: Some(description.to_string()),
        }
    }
}

/// Where a parameter's raw value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSource {
    Path,
    Query,
}

/// Declarative metadata for one declared response of an operation.
#[derive(Debug, Clone)]
pub struct ResponseSpec {
    pub status: StatusCode,
    pub kind: ContentKind,
    pub description: String,
}

impl ResponseSpec {
    /// A structured (JSON) response.
    pub fn json<D: ToString>(status: StatusCode, description: D) -> Self {
        ResponseSpec {
            status,
            kind: ContentKind::Json,
            description: description.to_string(),
        }
    }

    /// A plain-text response; scalar body-role values render as their
    /// literal text form.
    pub fn text<D: ToString>(status: StatusCode, description: D) -> Self {
        ResponseSpec {
            status,
            kind: ContentKind::Text,
            description: description.to_string(),
        }
    }

    /// An error response carrying the uniform [`ErrorModel`] shape.
    pub fn error<D: ToString>(status: StatusCode, description: D) -> Self {
        ResponseSpec {
            status,
            kind: ContentKind::Error,
            description: description.to_string(),
        }
    }
}

/// The wire encoding declared for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// structured (JSON) encoding, newline-terminated
    Json,
    /// literal text encoding for scalar values
    Text,
    /// structured encoding of the uniform error shape
    Error,
}

/// One API operation under construction: method, path template, descriptors,
/// and handler, assembled builder-style and then registered with an
/// [`ApiDescription`].
///
/// ```
/// use http::{Method, StatusCode};
/// use schemars::JsonSchema;
/// use serde::Serialize;
/// use turnstile::{ApiDescription, Json, Operation, Param, ResponseSpec};
///
/// #[derive(Serialize, JsonSchema)]
/// struct EchoResponse {
///     value: String,
/// }
///
/// let mut api = ApiDescription::new("Echo API", "1.0.0");
/// api.register(
///     Operation::new(Method::PUT, "/echo/:word")
///         .description("Echo back an input word.")
///         .param(Param::path("word", "The word to echo back"))
///         .param(Param::query("greet", "Return a greeting"))
///         .response(ResponseSpec::json(StatusCode::OK, "Successful echo"))
///         .handler("echo", |word: String, greet: Option<bool>| async move {
///             let value = if greet.unwrap_or(false) {
///                 format!("Hello, {}", word)
///             } else {
///                 word
///             };
///             (StatusCode::OK, Json(EchoResponse { value }))
///         }),
/// )
/// .unwrap();
/// ```
pub struct Operation {
    method: Method,
    path: String,
    description: Option<String>,
    params: Vec<Param>,
    responses: Vec<ResponseSpec>,
    operation_id: Option<String>,
    unbound: Option<Box<dyn UnboundHandler>>,
}

impl Operation {
    pub fn new(method: Method, path: &str) -> Self {
        Operation {
            method,
            path: path.to_string(),
            description: None,
            params: Vec::new(),
            responses: Vec::new(),
            operation_id: None,
            unbound: None,
        }
    }

    pub fn description<T: ToString>(mut self, description: T) -> Self {
        self.description.replace(description.to_string());
        self
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn response(mut self, response: ResponseSpec) -> Self {
        self.responses.push(response);
        self
    }

    /// Attach the handler function.  `operation_id` names the operation in
    /// the generated API description and in log messages.
    pub fn handler<FuncType, ArgTuple, Ret>(
        mut self,
        operation_id: &str,
        func: FuncType,
    ) -> Self
    where
        FuncType: HandlerFn<ArgTuple, Ret>,
        ArgTuple: ArgSet + 'static,
        Ret: HandlerResult,
    {
        self.operation_id = Some(operation_id.to_string());
        self.unbound = Some(new_unbound(func));
        self
    }
}

/// One registered operation: the analyzed metadata plus the bound handler.
/// Immutable once constructed; owned by the registry's router.
pub(crate) struct Endpoint {
    pub operation_id: String,
    pub method: Method,
    pub path: String,
    pub description: Option<String>,
    pub parameters: Vec<ParameterMeta>,
    pub body_schema: Option<SchemaSource>,
    pub payload: Option<PayloadRule>,
    pub responses: Vec<ResponseSpec>,
    pub handler: Box<dyn RouteHandler>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.method, self.path, self.operation_id)
    }
}

/// An `ApiDescription` represents the operations and handler functions in
/// your API.  It can be used to generate an OpenAPI document or to run an
/// HTTP server implementing the API.
///
/// All mutation happens through [`ApiDescription::register`], which is
/// expected to complete before the server begins accepting traffic; the
/// server freezes the description into an immutable snapshot at startup.
pub struct ApiDescription {
    title: String,
    version: String,
    /// In practice, all the information we need is encoded in the router.
    router: HttpRouter<Endpoint>,
}

impl ApiDescription {
    /// Create an empty registry.  `title` and `version` become the mandatory
    /// `info` properties of the generated OpenAPI document.
    pub fn new<S1: ToString, S2: ToString>(
        title: S1,
        version: S2,
    ) -> ApiDescription {
        ApiDescription {
            title: title.to_string(),
            version: version.to_string(),
            router: HttpRouter::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Register a new API operation.
    ///
    /// This runs signature analysis against the operation's descriptors and
    /// validates the whole registration; on any failure the operation is not
    /// added and the error describes the mismatch.
    pub fn register(
        &mut self,
        mut operation: Operation,
    ) -> Result<(), RegistrationError> {
        let unbound = operation.unbound.take().ok_or_else(|| {
            RegistrationError::MissingHandler {
                operation_id: format!(
                    "{} {}",
                    operation.method, operation.path
                ),
            }
        })?;
        let operation_id = operation
            .operation_id
            .clone()
            .expect("operation_id is set together with the handler");

        let info = unbound.analyze(&operation.params)?;

        self.validate_path_parameters(&operation, &info.parameters)?;

        let plan = BindingPlan {
            args: info.rules,
            responses: operation
                .responses
                .iter()
                .map(|r| ResponseRule { status: r.status, kind: r.kind })
                .collect(),
        };
        let handler = unbound.bind(operation_id.clone(), plan);

        let endpoint = Endpoint {
            operation_id,
            method: operation.method.clone(),
            path: operation.path.clone(),
            description: operation.description,
            parameters: info.parameters,
            body_schema: info.body_schema,
            payload: info.payload,
            responses: operation.responses,
            handler,
        };

        self.router.insert(&operation.method, &operation.path, endpoint)
    }

    /// Validate that the variables in the path template and the path-source
    /// parameter descriptors are identical, and that no query parameter
    /// shadows a path variable.
    fn validate_path_parameters(
        &self,
        operation: &Operation,
        parameters: &[ParameterMeta],
    ) -> Result<(), RegistrationError> {
        let template = route_path_varnames(&operation.path)?
            .into_iter()
            .collect::<BTreeSet<_>>();
        let declared = parameters
            .iter()
            .filter(|p| p.source == ParamSource::Path)
            .map(|p| p.name.clone())
            .collect::<BTreeSet<_>>();

        let unconsumed =
            template.difference(&declared).cloned().collect::<Vec<_>>();
        if !unconsumed.is_empty() {
            return Err(RegistrationError::PathParametersNotConsumed {
                names: unconsumed.join(","),
            });
        }
        let missing =
            declared.difference(&template).cloned().collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(RegistrationError::ParametersNotInPath {
                names: missing.join(","),
            });
        }

        for param in parameters {
            if param.source == ParamSource::Query
                && template.contains(&param.name)
            {
                return Err(RegistrationError::QueryShadowsPathParameter {
                    name: param.name.clone(),
                });
            }
        }

        Ok(())
    }

    pub(crate) fn lookup_route(
        &self,
        method: &Method,
        path: &str,
    ) -> Result<RouterLookupResult<'_, Endpoint>, HttpError> {
        self.router.lookup_route(method, path)
    }

    pub(crate) fn endpoints(&self) -> Vec<&Endpoint> {
        self.router.values()
    }

    /// Build the OpenAPI definition describing this API.  Returns an
    /// [`OpenApiDefinition`] which can be used to select an output form.
    pub fn openapi(&self) -> OpenApiDefinition<'_> {
        OpenApiDefinition { api: self }
    }

    /// Internal routine for constructing the OpenAPI definition describing
    /// this API in its JSON form.
    fn gen_openapi(&self) -> openapiv3::OpenAPI {
        let mut openapi = openapiv3::OpenAPI {
            openapi: "3.0.3".to_string(),
            info: openapiv3::Info {
                title: self.title.clone(),
                version: self.version.clone(),
                ..Default::default()
            },
            ..Default::default()
        };

        let settings = schemars::gen::SchemaSettings::openapi3();
        let mut generator = schemars::gen::SchemaGenerator::new(settings);
        let mut definitions =
            indexmap::IndexMap::<String, schemars::schema::Schema>::new();

        for endpoint in self.endpoints() {
            let path = openapi
                .paths
                .paths
                .entry(openapi_path(&endpoint.path))
                .or_insert(openapiv3::ReferenceOr::Item(
                    openapiv3::PathItem::default(),
                ));

            let pathitem = match path {
                openapiv3::ReferenceOr::Item(ref mut item) => item,
                _ => panic!("reference not expected"),
            };

            let method_ref = match endpoint.method.as_str() {
                "GET" => &mut pathitem.get,
                "PUT" => &mut pathitem.put,
                "POST" => &mut pathitem.post,
                "DELETE" => &mut pathitem.delete,
                "OPTIONS" => &mut pathitem.options,
                "HEAD" => &mut pathitem.head,
                "PATCH" => &mut pathitem.patch,
                "TRACE" => &mut pathitem.trace,
                other => panic!("unexpected method `{}`", other),
            };

            let mut operation = openapiv3::Operation {
                operation_id: Some(endpoint.operation_id.clone()),
                description: endpoint.description.clone(),
                ..Default::default()
            };

            operation.parameters = endpoint
                .parameters
                .iter()
                .map(|param| {
                    let (name, js) = schema_to_json_schema(
                        &param.schema,
                        &mut generator,
                        &mut definitions,
                    );
                    let schema = j2oas_schema(name.as_ref(), &js);

                    let parameter_data = openapiv3::ParameterData {
                        name: param.name.clone(),
                        description: param.description.clone(),
                        required: param.required,
                        deprecated: None,
                        format: openapiv3::ParameterSchemaOrContent::Schema(
                            schema,
                        ),
                        example: None,
                        examples: indexmap::IndexMap::new(),
                        extensions: indexmap::IndexMap::new(),
                        explode: None,
                    };
                    match param.source {
                        ParamSource::Query => openapiv3::ReferenceOr::Item(
                            openapiv3::Parameter::Query {
                                parameter_data,
                                allow_reserved: false,
                                style: openapiv3::QueryStyle::Form,
                                allow_empty_value: None,
                            },
                        ),
                        ParamSource::Path => openapiv3::ReferenceOr::Item(
                            openapiv3::Parameter::Path {
                                parameter_data,
                                style: openapiv3::PathStyle::Simple,
                            },
                        ),
                    }
                })
                .collect::<Vec<_>>();

            operation.request_body = endpoint.body_schema.as_ref().map(
                |body_schema| {
                    let (name, js) = schema_to_json_schema(
                        body_schema,
                        &mut generator,
                        &mut definitions,
                    );
                    let schema = j2oas_schema(name.as_ref(), &js);

                    let mut content = indexmap::IndexMap::new();
                    content.insert(
                        CONTENT_TYPE_JSON.to_string(),
                        openapiv3::MediaType {
                            schema: Some(schema),
                            ..Default::default()
                        },
                    );

                    openapiv3::ReferenceOr::Item(openapiv3::RequestBody {
                        content,
                        required: true,
                        ..Default::default()
                    })
                },
            );

            for response_spec in &endpoint.responses {
                let mut content = indexmap::IndexMap::new();
                match response_spec.kind {
                    ContentKind::Json => {
                        if let Some(schema_source) = endpoint
                            .payload
                            .as_ref()
                            .and_then(|payload| payload.schema.as_ref())
                        {
                            let (name, js) = schema_to_json_schema(
                                schema_source,
                                &mut generator,
                                &mut definitions,
                            );
                            content.insert(
                                CONTENT_TYPE_JSON.to_string(),
                                openapiv3::MediaType {
                                    schema: Some(j2oas_schema(
                                        name.as_ref(),
                                        &js,
                                    )),
                                    ..Default::default()
                                },
                            );
                        }
                    }
                    ContentKind::Text => {
                        let schema = match endpoint
                            .payload
                            .as_ref()
                            .and_then(|payload| payload.schema.as_ref())
                        {
                            Some(schema_source) => {
                                let (name, js) = schema_to_json_schema(
                                    schema_source,
                                    &mut generator,
                                    &mut definitions,
                                );
                                j2oas_schema(name.as_ref(), &js)
                            }
                            None => openapiv3::ReferenceOr::Item(
                                openapiv3::Schema {
                                    schema_data: Default::default(),
                                    schema_kind: openapiv3::SchemaKind::Type(
                                        openapiv3::Type::String(
                                            Default::default(),
                                        ),
                                    ),
                                },
                            ),
                        };
                        content.insert(
                            "text/plain".to_string(),
                            openapiv3::MediaType {
                                schema: Some(schema),
                                ..Default::default()
                            },
                        );
                    }
                    ContentKind::Error => {
                        let js = generator.subschema_for::<ErrorModel>();
                        content.insert(
                            CONTENT_TYPE_JSON.to_string(),
                            openapiv3::MediaType {
                                schema: Some(j2oas_schema(None, &js)),
                                ..Default::default()
                            },
                        );
                    }
                }

                let response = openapiv3::Response {
                    description: response_spec.description.clone(),
                    content,
                    ..Default::default()
                };
                operation.responses.responses.insert(
                    openapiv3::StatusCode::Code(
                        response_spec.status.as_u16(),
                    ),
                    openapiv3::ReferenceOr::Item(response),
                );
            }

            // Drop in the operation.
            method_ref.replace(operation);
        }

        // Add the schemas for which we generated references.
        let components = openapi
            .components
            .get_or_insert_with(openapiv3::Components::default);
        let schemas = &mut components.schemas;

        let root_schema = generator.into_root_schema_for::<()>();
        root_schema.definitions.iter().for_each(|(key, schema)| {
            schemas.insert(key.clone(), j2oas_schema(None, schema));
        });

        definitions.into_iter().for_each(|(key, schema)| {
            if !schemas.contains_key(&key) {
                schemas.insert(key, j2oas_schema(None, &schema));
            }
        });

        openapi
    }
}

/// Render a [`SchemaSource`] against the document-wide generator, collecting
/// static dependencies along the way.
fn schema_to_json_schema(
    source: &SchemaSource,
    generator: &mut schemars::gen::SchemaGenerator,
    definitions: &mut indexmap::IndexMap<String, schemars::schema::Schema>,
) -> (Option<String>, schemars::schema::Schema) {
    match source {
        SchemaSource::Gen { name, schema } => {
            (Some(name()), schema(generator))
        }
        SchemaSource::Static { schema, dependencies } => {
            definitions.extend(dependencies.clone());
            (None, (**schema).clone())
        }
    }
}

/// Translate a `:name`-style path template into the `{name}` form used by
/// OpenAPI.
fn openapi_path(path: &str) -> String {
    let translated = route_path_to_segments(path)
        .iter()
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{}}}", name),
            None => segment.to_string(),
        })
        .fold(String::new(), |mut acc, segment| {
            acc.push('/');
            acc.push_str(&segment);
            acc
        });
    if translated.is_empty() {
        "/".to_string()
    } else {
        translated
    }
}

/// A handle for emitting the OpenAPI definition for an [`ApiDescription`] in
/// one of several forms.
pub struct OpenApiDefinition<'a> {
    api: &'a ApiDescription,
}

impl OpenApiDefinition<'_> {
    /// Build the OpenAPI definition as a [`serde_json::Value`].
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.api.gen_openapi())
    }

    /// Write the OpenAPI definition, pretty-printed, to `out`.
    pub fn write(&self, out: &mut dyn std::io::Write) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(&mut *out, &self.api.gen_openapi())?;
        writeln!(out).map_err(serde_json::Error::io)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::openapi_path;

    #[test]
    fn test_openapi_path_translation() {
        assert_eq!(openapi_path("/echo/:word"), "/echo/{word}");
        assert_eq!(
            openapi_path("/projects/:project/instances/:instance"),
            "/projects/{project}/instances/{instance}"
        );
        assert_eq!(openapi_path("/hello"), "/hello");
        assert_eq!(openapi_path("/"), "/");
    }
}
