//! Routes incoming HTTP requests to registered operations

use crate::error::HttpError;
use crate::error::RegistrationError;
use http::Method;
use http::StatusCode;
use percent_encoding::percent_decode_str;
use std::collections::BTreeMap;

/// `HttpRouter` is a simple data structure for mapping an HTTP method and URI
/// path to a value (for us: a registered operation).
///
/// Routes are registered and looked up according to a path like
/// `"/projects/:project"`.  Paths are split into segments separated by one or
/// more `/` characters.  When registering a route, a path segment may be
/// either a literal string or a variable, the latter indicated by a leading
/// colon.  A variable matches any single segment of an incoming path and the
/// matched text is reported to the caller by name.
///
/// The implementation is a trie whose edges represent segments of the URI
/// path.  To register or look up the path `"/foo/bar/baz"`, we start at the
/// root and traverse edges for the literal strings `"foo"`, `"bar"`, and
/// `"baz"`, arriving at a particular node.  Each node has a set of values,
/// one per HTTP method.
///
/// We make (and enforce) a few simplifying assumptions, all reported as
/// registration errors rather than silently tolerated:
///
/// * A node may have either literal-segment children or a variable-segment
///   child, but not both.  You can't register both `"/projects/:id"` and
///   `"/projects/default"`.
///
/// * All routes through a given variable node must use the same variable
///   name.  You can't register `"/projects/:id"` and
///   `"/projects/:project_id/info"`.
///
/// * A given path cannot use the same variable name twice.
///
/// * A given node may have at most one value per HTTP method.
///
/// The expectation is that all insertions happen while the server is being
/// set up and the router is read-only once the server begins accepting
/// requests.
#[derive(Debug)]
pub(crate) struct HttpRouter<T> {
    root: Box<HttpRouterNode<T>>,
}

#[derive(Debug)]
struct HttpRouterNode<T> {
    /// values for each of the HTTP methods with a route ending at this node
    methods: BTreeMap<String, T>,
    /// edges linking to child nodes
    edges: Option<HttpRouterEdges<T>>,
}

#[derive(Debug)]
enum HttpRouterEdges<T> {
    /// outgoing edges for literal path segments
    Literals(BTreeMap<String, Box<HttpRouterNode<T>>>),
    /// outgoing edge for variable-named path segments
    Variable(String, Box<HttpRouterNode<T>>),
}

/// `PathSegment` represents a segment in a URI path template.  Each segment
/// may be either a literal string or a variable, written with a leading colon
/// (e.g. `:word`).
#[derive(Debug, PartialEq)]
pub(crate) enum PathSegment {
    Literal(String),
    Varname(String),
}

impl PathSegment {
    fn parse(segment: &str, path: &str) -> Result<Self, RegistrationError> {
        match segment.strip_prefix(':') {
            Some("") => Err(RegistrationError::InvalidPathTemplate {
                path: path.to_string(),
                reason: "path segment variable name must not be empty"
                    .to_string(),
            }),
            Some(varname) => Ok(PathSegment::Varname(varname.to_string())),
            None => Ok(PathSegment::Literal(segment.to_string())),
        }
    }
}

/// Map of variable names to the path segments they matched.
pub(crate) type VariableSet = BTreeMap<String, String>;

/// A successful route lookup: the stored value plus the variable assignments
/// made while matching the incoming path.
#[derive(Debug)]
pub(crate) struct RouterLookupResult<'a, T> {
    pub value: &'a T,
    pub variables: VariableSet,
}

impl<T> HttpRouterNode<T> {
    fn new() -> Self {
        HttpRouterNode { methods: BTreeMap::new(), edges: None }
    }
}

impl<T> HttpRouter<T> {
    /// Returns a new `HttpRouter` with no routes configured.
    pub fn new() -> Self {
        HttpRouter { root: Box::new(HttpRouterNode::new()) }
    }

    /// Register a value for HTTP requests matching `method` and `path`.  See
    /// the `HttpRouter` docs for how `path` is processed.
    pub fn insert(
        &mut self,
        method: &Method,
        path: &str,
        value: T,
    ) -> Result<(), RegistrationError> {
        let mut varnames: Vec<String> = Vec::new();

        let mut node: &mut Box<HttpRouterNode<T>> = &mut self.root;
        for raw_segment in route_path_to_segments(path) {
            let segment = PathSegment::parse(raw_segment, path)?;

            node = match segment {
                PathSegment::Literal(lit) => {
                    let edges = node.edges.get_or_insert(
                        HttpRouterEdges::Literals(BTreeMap::new()),
                    );
                    match edges {
                        // We do not allow both literal and variable edges
                        // from the same node.  This could be supported, but
                        // it seems more likely to be a mistake.
                        HttpRouterEdges::Variable(varname, _) => {
                            return Err(RegistrationError::RouteConflict {
                                path: path.to_string(),
                                reason: format!(
                                    "attempted to register route for literal \
                                     path segment \"{}\" when a route exists \
                                     for variable path segment (variable \
                                     name: \"{}\")",
                                    lit, varname
                                ),
                            });
                        }
                        HttpRouterEdges::Literals(literals) => literals
                            .entry(lit)
                            .or_insert_with(|| Box::new(HttpRouterNode::new())),
                    }
                }

                PathSegment::Varname(new_varname) => {
                    if varnames.contains(&new_varname) {
                        return Err(RegistrationError::RouteConflict {
                            path: path.to_string(),
                            reason: format!(
                                "variable name \"{}\" is used more than once",
                                new_varname
                            ),
                        });
                    }
                    varnames.push(new_varname.clone());

                    let edges =
                        node.edges.get_or_insert(HttpRouterEdges::Variable(
                            new_varname.clone(),
                            Box::new(HttpRouterNode::new()),
                        ));
                    match edges {
                        // See the analogous check above about combining
                        // literal and variable path segments.
                        HttpRouterEdges::Literals(_) => {
                            return Err(RegistrationError::RouteConflict {
                                path: path.to_string(),
                                reason: format!(
                                    "attempted to register route for \
                                     variable path segment (variable name: \
                                     \"{}\") when a route already exists for \
                                     a literal path segment",
                                    new_varname
                                ),
                            })
                        }

                        HttpRouterEdges::Variable(varname, node) => {
                            if *new_varname != *varname {
                                // Don't allow different names for the same
                                // part of the path.
                                return Err(
                                    RegistrationError::RouteConflict {
                                        path: path.to_string(),
                                        reason: format!(
                                            "attempted to use variable name \
                                             \"{}\", but a different name \
                                             (\"{}\") has already been used \
                                             for this segment",
                                            new_varname, varname
                                        ),
                                    },
                                );
                            }

                            node
                        }
                    }
                }
            };
        }

        let methodname = method.as_str().to_uppercase();
        if node.methods.contains_key(&methodname) {
            return Err(RegistrationError::DuplicateRoute {
                method: method.to_string(),
                path: path.to_string(),
            });
        }

        node.methods.insert(methodname, value);
        Ok(())
    }

    /// Look up the value registered for an HTTP request with method `method`
    /// and URI path `path`.  A successful lookup includes the variable
    /// assignments made while matching the path.  On failure, this returns an
    /// `HttpError` appropriate for the failure mode (404 for an unknown path,
    /// 405 for a known path with no route for this method).
    pub fn lookup_route<'a>(
        &'a self,
        method: &Method,
        path: &str,
    ) -> Result<RouterLookupResult<'a, T>, HttpError> {
        let all_segments = input_path_to_segments(path).map_err(|_| {
            HttpError::for_bad_request(String::from("invalid path encoding"))
        })?;
        let mut node = &self.root;
        let mut variables = VariableSet::new();

        for segment in all_segments {
            node = match &node.edges {
                None => None,
                Some(HttpRouterEdges::Literals(edges)) => edges.get(&segment),
                Some(HttpRouterEdges::Variable(varname, node)) => {
                    variables.insert(varname.clone(), segment);
                    Some(node)
                }
            }
            .ok_or_else(|| {
                HttpError::for_not_found(String::from(
                    "no route found (no path in router)",
                ))
            })?;
        }

        let methodname = method.as_str().to_uppercase();
        node.methods
            .get(&methodname)
            .map(|value| RouterLookupResult { value, variables })
            .ok_or_else(|| {
                if node.methods.is_empty() {
                    HttpError::for_not_found(String::from(
                        "route has no handlers",
                    ))
                } else {
                    HttpError::for_client_error(
                        StatusCode::METHOD_NOT_ALLOWED,
                        String::from("method not allowed"),
                    )
                }
            })
    }

    /// Returns all registered values, in depth-first path order.  Used to
    /// synthesize the API description document.
    pub fn values(&self) -> Vec<&T> {
        let mut out = Vec::new();
        collect_values(&self.root, &mut out);
        out
    }
}

fn collect_values<'a, T>(
    node: &'a HttpRouterNode<T>,
    out: &mut Vec<&'a T>,
) {
    out.extend(node.methods.values());
    match &node.edges {
        None => {}
        Some(HttpRouterEdges::Literals(edges)) => {
            for child in edges.values() {
                collect_values(child, out);
            }
        }
        Some(HttpRouterEdges::Variable(_, child)) => {
            collect_values(child, out);
        }
    }
}

/// Split a path template into non-empty segments.  Multiple adjacent `/`
/// characters are treated as one separator, so `"/foo//bar"` and
/// `"/foo/bar"` name the same route.
pub(crate) fn route_path_to_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Returns the variable names appearing in a path template, in order.
pub(crate) fn route_path_varnames(
    path: &str,
) -> Result<Vec<String>, RegistrationError> {
    let mut varnames = Vec::new();
    for segment in route_path_to_segments(path) {
        if let PathSegment::Varname(name) = PathSegment::parse(segment, path)? {
            varnames.push(name);
        }
    }
    Ok(varnames)
}

/// Split an incoming request path into percent-decoded segments.  Fails if a
/// segment is not valid percent-encoded UTF-8.
fn input_path_to_segments(path: &str) -> Result<Vec<String>, ()> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            percent_decode_str(segment)
                .decode_utf8()
                .map(|decoded| decoded.to_string())
                .map_err(|_| ())
        })
        .collect()
}
