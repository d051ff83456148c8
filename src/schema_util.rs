//! Utility functions for working with JsonSchema types and converting them
//! into their OpenAPI representation.

use indexmap::IndexMap;
use schemars::JsonSchema;

/// Wrapper for both dynamically generated and pre-generated schemas.
///
/// Schemas for request and response body types are generated lazily
/// (`Gen`) against the shared schema generator so that named types land in
/// the document's components section exactly once.  Schemas for scalar
/// parameters are generated eagerly at registration time (`Static`) since
/// they're self-contained.
#[derive(Clone)]
pub enum SchemaSource {
    Gen {
        name: fn() -> String,
        schema:
            fn(&mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema,
    },
    Static {
        schema: Box<schemars::schema::Schema>,
        dependencies: IndexMap<String, schemars::schema::Schema>,
    },
}

impl std::fmt::Debug for SchemaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaSource::Gen { .. } => f.write_str("[schema generator]"),
            SchemaSource::Static { schema, .. } => {
                f.write_str(format!("{:?}", schema).as_str())
            }
        }
    }
}

impl SchemaSource {
    /// Produce a `Gen` source for a named type.
    pub(crate) fn generated_for<T: JsonSchema>() -> SchemaSource {
        SchemaSource::Gen {
            name: T::schema_name,
            schema: make_subschema_for::<T>,
        }
    }

    /// Produce a `Static` source by running a standalone generator for `T`
    /// right away.  Used for scalar parameter types, whose schemas are small
    /// and reference-free.
    pub(crate) fn static_for<T: JsonSchema>() -> SchemaSource {
        let mut generator = schemars::gen::SchemaGenerator::new(
            schemars::gen::SchemaSettings::openapi3(),
        );
        let root = generator.root_schema_for::<T>();
        SchemaSource::Static {
            schema: Box::new(schemars::schema::Schema::Object(root.schema)),
            dependencies: root.definitions.into_iter().collect(),
        }
    }
}

pub(crate) fn make_subschema_for<T: JsonSchema>(
    generator: &mut schemars::gen::SchemaGenerator,
) -> schemars::schema::Schema {
    generator.subschema_for::<T>()
}

/// Convert from JSON Schema into OpenAPI.
// The versions of JSON Schema that the schemars and openapiv3 crates adhere
// to are just different enough to make the conversion a real pain in the
// neck.  This handles the subset of constructs that can appear in the types
// accepted by the registration traits: scalars, objects, arrays, references,
// enumerations, and simple subschema combinators.
pub(crate) fn j2oas_schema(
    name: Option<&String>,
    schema: &schemars::schema::Schema,
) -> openapiv3::ReferenceOr<openapiv3::Schema> {
    match schema {
        // The permissive, "match anything" schema.  We'll typically see this
        // when consumers use a type such as serde_json::Value.
        schemars::schema::Schema::Bool(true) => {
            openapiv3::ReferenceOr::Item(openapiv3::Schema {
                schema_data: openapiv3::SchemaData::default(),
                schema_kind: openapiv3::SchemaKind::Any(
                    openapiv3::AnySchema::default(),
                ),
            })
        }
        schemars::schema::Schema::Bool(false) => {
            panic!("We don't expect to see a schema that matches the null set")
        }
        schemars::schema::Schema::Object(obj) => j2oas_schema_object(name, obj),
    }
}

fn j2oas_schema_vec(
    schemas: &Option<Vec<schemars::schema::Schema>>,
) -> Vec<openapiv3::ReferenceOr<openapiv3::Schema>> {
    schemas
        .as_ref()
        .map(|v| v.iter().map(|schema| j2oas_schema(None, schema)).collect())
        .unwrap_or_default()
}

fn j2oas_schema_object(
    name: Option<&String>,
    obj: &schemars::schema::SchemaObject,
) -> openapiv3::ReferenceOr<openapiv3::Schema> {
    if let Some(reference) = &obj.reference {
        return openapiv3::ReferenceOr::Reference {
            reference: reference.clone(),
        };
    }

    let kind = j2oas_schema_object_kind(obj);

    let mut data = openapiv3::SchemaData::default();

    if matches!(
        &obj.extensions.get("nullable"),
        Some(serde_json::Value::Bool(true))
    ) {
        data.nullable = true;
    }

    if let Some(metadata) = &obj.metadata {
        data.title.clone_from(&metadata.title);
        data.description.clone_from(&metadata.description);
        data.default.clone_from(&metadata.default);
        data.deprecated = metadata.deprecated;
        data.read_only = metadata.read_only;
        data.write_only = metadata.write_only;
    }

    if let Some(name) = name {
        data.title = Some(name.clone());
    }
    if let Some(example) = obj.extensions.get("example") {
        data.example = Some(example.clone());
    }

    openapiv3::ReferenceOr::Item(openapiv3::Schema {
        schema_data: data,
        schema_kind: kind,
    })
}

fn j2oas_schema_object_kind(
    obj: &schemars::schema::SchemaObject,
) -> openapiv3::SchemaKind {
    let ty = match &obj.instance_type {
        Some(schemars::schema::SingleOrVec::Single(ty)) => Some(ty.as_ref()),
        Some(schemars::schema::SingleOrVec::Vec(_)) => {
            panic!(
                "a type array is unsupported by openapiv3:\n{}",
                serde_json::to_string_pretty(obj)
                    .unwrap_or_else(|_| "<can't serialize>".to_string())
            )
        }
        None => None,
    };

    match (ty, &obj.subschemas) {
        (Some(schemars::schema::InstanceType::Null), None) => {
            openapiv3::SchemaKind::Type(openapiv3::Type::String(
                openapiv3::StringType {
                    enumeration: vec![None],
                    ..Default::default()
                },
            ))
        }
        (Some(schemars::schema::InstanceType::Boolean), None) => {
            openapiv3::SchemaKind::Type(openapiv3::Type::Boolean(
                openapiv3::BooleanType::default(),
            ))
        }
        (Some(schemars::schema::InstanceType::Object), None) => {
            openapiv3::SchemaKind::Type(openapiv3::Type::Object(j2oas_object(
                &obj.object,
            )))
        }
        (Some(schemars::schema::InstanceType::Array), None) => {
            openapiv3::SchemaKind::Type(openapiv3::Type::Array(j2oas_array(
                &obj.array,
            )))
        }
        (Some(schemars::schema::InstanceType::Number), None) => {
            openapiv3::SchemaKind::Type(openapiv3::Type::Number(j2oas_number(
                &obj.format,
                &obj.number,
            )))
        }
        (Some(schemars::schema::InstanceType::String), None) => {
            openapiv3::SchemaKind::Type(openapiv3::Type::String(j2oas_string(
                &obj.format,
                &obj.string,
                &obj.enum_values,
            )))
        }
        (Some(schemars::schema::InstanceType::Integer), None) => {
            j2oas_integer(&obj.format, &obj.number)
        }
        (None, Some(subschema)) => j2oas_subschemas(subschema),
        (None, None) => {
            openapiv3::SchemaKind::Any(openapiv3::AnySchema::default())
        }
        (Some(_), Some(_)) => {
            // A type alongside subschemas is produced only by exotic schema
            // customizations; a permissive representation preserves the
            // combinators, which is the part consumers rely on.
            let mut any = openapiv3::AnySchema {
                format: obj.format.clone(),
                ..Default::default()
            };
            if let Some(subschemas) = &obj.subschemas {
                any.all_of = j2oas_schema_vec(&subschemas.all_of);
                any.any_of = j2oas_schema_vec(&subschemas.any_of);
                any.one_of = j2oas_schema_vec(&subschemas.one_of);
                any.not = subschemas
                    .not
                    .as_ref()
                    .map(|schema| Box::new(j2oas_schema(None, schema)));
            }
            openapiv3::SchemaKind::Any(any)
        }
    }
}

fn j2oas_subschemas(
    subschemas: &schemars::schema::SubschemaValidation,
) -> openapiv3::SchemaKind {
    match (
        &subschemas.all_of,
        &subschemas.any_of,
        &subschemas.one_of,
        &subschemas.not,
    ) {
        (all_of @ Some(_), None, None, None) => {
            openapiv3::SchemaKind::AllOf { all_of: j2oas_schema_vec(all_of) }
        }
        (None, any_of @ Some(_), None, None) => {
            openapiv3::SchemaKind::AnyOf { any_of: j2oas_schema_vec(any_of) }
        }
        (None, None, one_of @ Some(_), None) => {
            openapiv3::SchemaKind::OneOf { one_of: j2oas_schema_vec(one_of) }
        }
        (None, None, None, Some(not)) => openapiv3::SchemaKind::Not {
            not: Box::new(j2oas_schema(None, not)),
        },
        _ => panic!("invalid subschema {:#?}", subschemas),
    }
}

fn j2oas_integer(
    format: &Option<String>,
    number: &Option<Box<schemars::schema::NumberValidation>>,
) -> openapiv3::SchemaKind {
    let format = match format.as_ref().map(|s| s.as_str()) {
        None => openapiv3::VariantOrUnknownOrEmpty::Empty,
        Some("int32") => openapiv3::VariantOrUnknownOrEmpty::Item(
            openapiv3::IntegerFormat::Int32,
        ),
        Some("int64") => openapiv3::VariantOrUnknownOrEmpty::Item(
            openapiv3::IntegerFormat::Int64,
        ),
        Some(other) => {
            openapiv3::VariantOrUnknownOrEmpty::Unknown(other.to_string())
        }
    };

    let (minimum, maximum) = match number {
        None => (None, None),
        Some(number) => (
            number.minimum.map(|f| f as i64),
            number.maximum.map(|f| f as i64),
        ),
    };

    openapiv3::SchemaKind::Type(openapiv3::Type::Integer(
        openapiv3::IntegerType {
            format,
            minimum,
            maximum,
            ..Default::default()
        },
    ))
}

fn j2oas_number(
    format: &Option<String>,
    number: &Option<Box<schemars::schema::NumberValidation>>,
) -> openapiv3::NumberType {
    let format = match format.as_ref().map(|s| s.as_str()) {
        None => openapiv3::VariantOrUnknownOrEmpty::Empty,
        Some("float") => openapiv3::VariantOrUnknownOrEmpty::Item(
            openapiv3::NumberFormat::Float,
        ),
        Some("double") => openapiv3::VariantOrUnknownOrEmpty::Item(
            openapiv3::NumberFormat::Double,
        ),
        Some(other) => {
            openapiv3::VariantOrUnknownOrEmpty::Unknown(other.to_string())
        }
    };

    let (minimum, maximum) = match number {
        None => (None, None),
        Some(number) => (number.minimum, number.maximum),
    };

    openapiv3::NumberType { format, minimum, maximum, ..Default::default() }
}

fn j2oas_string(
    format: &Option<String>,
    string: &Option<Box<schemars::schema::StringValidation>>,
    enum_values: &Option<Vec<serde_json::value::Value>>,
) -> openapiv3::StringType {
    let format = match format.as_ref().map(|s| s.as_str()) {
        None => openapiv3::VariantOrUnknownOrEmpty::Empty,
        Some("date") => openapiv3::VariantOrUnknownOrEmpty::Item(
            openapiv3::StringFormat::Date,
        ),
        Some("date-time") => openapiv3::VariantOrUnknownOrEmpty::Item(
            openapiv3::StringFormat::DateTime,
        ),
        Some(other) => {
            openapiv3::VariantOrUnknownOrEmpty::Unknown(other.to_string())
        }
    };

    let (max_length, min_length, pattern) = match string.as_ref() {
        None => (None, None, None),
        Some(string) => (
            string.max_length.map(|n| n as usize),
            string.min_length.map(|n| n as usize),
            string.pattern.clone(),
        ),
    };

    let enumeration = enum_values
        .iter()
        .flat_map(|v| {
            v.iter().map(|vv| match vv {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                _ => panic!("unexpected enumeration value {:?}", vv),
            })
        })
        .collect::<Vec<_>>();

    openapiv3::StringType { format, pattern, enumeration, min_length, max_length }
}

fn j2oas_array(
    array: &Option<Box<schemars::schema::ArrayValidation>>,
) -> openapiv3::ArrayType {
    let arr = array.as_ref().unwrap();

    openapiv3::ArrayType {
        items: match &arr.items {
            Some(schemars::schema::SingleOrVec::Single(schema)) => {
                Some(box_reference_or(j2oas_schema(None, schema)))
            }
            Some(schemars::schema::SingleOrVec::Vec(_)) => {
                panic!("OpenAPI v3.0.x cannot support tuple-like arrays")
            }
            None => None,
        },
        min_items: arr.min_items.map(|n| n as usize),
        max_items: arr.max_items.map(|n| n as usize),
        unique_items: arr.unique_items.unwrap_or(false),
    }
}

fn box_reference_or<T>(
    r: openapiv3::ReferenceOr<T>,
) -> openapiv3::ReferenceOr<Box<T>> {
    match r {
        openapiv3::ReferenceOr::Item(schema) => {
            openapiv3::ReferenceOr::boxed_item(schema)
        }
        openapiv3::ReferenceOr::Reference { reference } => {
            openapiv3::ReferenceOr::Reference { reference }
        }
    }
}

fn j2oas_object(
    object: &Option<Box<schemars::schema::ObjectValidation>>,
) -> openapiv3::ObjectType {
    match object {
        None => Default::default(),
        Some(obj) => openapiv3::ObjectType {
            properties: obj
                .properties
                .iter()
                .map(|(prop, schema)| {
                    (prop.clone(), box_reference_or(j2oas_schema(None, schema)))
                })
                .collect::<_>(),
            required: obj.required.iter().cloned().collect::<_>(),
            additional_properties: obj.additional_properties.as_ref().map(
                |schema| match schema.as_ref() {
                    schemars::schema::Schema::Bool(b) => {
                        openapiv3::AdditionalProperties::Any(*b)
                    }
                    schemars::schema::Schema::Object(_) => {
                        openapiv3::AdditionalProperties::Schema(Box::new(
                            j2oas_schema(None, schema),
                        ))
                    }
                },
            ),
            min_properties: obj.min_properties.map(|n| n as usize),
            max_properties: obj.max_properties.map(|n| n as usize),
        },
    }
}

#[cfg(test)]
mod test {
    use super::j2oas_schema;
    use super::SchemaSource;
    use schemars::JsonSchema;

    #[test]
    fn test_static_scalar_schema() {
        let source = SchemaSource::static_for::<bool>();
        let SchemaSource::Static { schema, dependencies } = source else {
            panic!("expected a static schema");
        };
        assert!(dependencies.is_empty());
        let value = serde_json::to_value(&*schema).unwrap();
        assert_eq!(value["type"], "boolean");
    }

    #[test]
    fn test_j2oas_simple_object() {
        #[derive(JsonSchema)]
        #[allow(dead_code)]
        struct Widget {
            name: String,
            count: u32,
            enabled: Option<bool>,
        }

        let mut generator = schemars::gen::SchemaGenerator::new(
            schemars::gen::SchemaSettings::openapi3(),
        );
        let root = generator.root_schema_for::<Widget>();
        let oas = j2oas_schema(
            None,
            &schemars::schema::Schema::Object(root.schema),
        );
        let value = serde_json::to_value(&oas).unwrap();
        assert_eq!(value["type"], "object");
        assert_eq!(value["properties"]["name"]["type"], "string");
        assert_eq!(value["properties"]["count"]["type"], "integer");
        let required = value["required"].as_array().unwrap();
        assert!(required.contains(&serde_json::json!("name")));
        assert!(!required.contains(&serde_json::json!("enabled")));
    }
}
