use serde_json::Value;

use crate::error::OtMcpError;
use crate::sources::opentargets::OPEN_TARGETS_API;

/// Standard introspection document, seven type-ref levels deep. That is
/// enough for every wrapper combination the platform schema uses.
pub const INTROSPECTION_QUERY: &str = r#"query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    subscriptionType { name }
    types {
      kind
      name
      description
      fields(includeDeprecated: true) {
        name
        args { ...InputValue }
        type { ...TypeRef }
      }
      inputFields { ...InputValue }
      interfaces { ...TypeRef }
      enumValues(includeDeprecated: true) { name }
      possibleTypes { ...TypeRef }
    }
  }
}

fragment InputValue on __InputValue {
  name
  type { ...TypeRef }
  defaultValue
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
        ofType {
          kind
          name
          ofType {
            kind
            name
            ofType {
              kind
              name
              ofType { kind name }
            }
          }
        }
      }
    }
  }
}"#;

/// Render introspection data as SDL text.
///
/// Missing names or refs render as placeholders rather than failing the
/// whole dump. Only a response without `__schema` at all is an error.
pub fn render_sdl(data: &Value) -> Result<String, OtMcpError> {
    let schema = data
        .get("__schema")
        .and_then(Value::as_object)
        .ok_or_else(|| OtMcpError::Api {
            api: OPEN_TARGETS_API,
            message: "introspection response did not include __schema".to_string(),
        })?;

    let mut out = String::new();
    render_root_block(schema, &mut out);

    let types = schema
        .get("types")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    for type_def in types {
        let name = str_field(type_def, "name");
        if name.starts_with("__") {
            continue;
        }
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        render_type(type_def, name, &mut out);
    }
    out.push('\n');
    Ok(out)
}

/// The `schema { ... }` block is only needed when a root type deviates from
/// its conventional name.
fn render_root_block(schema: &serde_json::Map<String, Value>, out: &mut String) {
    let roots = [
        ("query", schema.get("queryType"), "Query"),
        ("mutation", schema.get("mutationType"), "Mutation"),
        ("subscription", schema.get("subscriptionType"), "Subscription"),
    ];
    let custom = roots.iter().any(|(_, type_ref, default)| {
        type_ref
            .and_then(|v| v.get("name"))
            .and_then(Value::as_str)
            .is_some_and(|name| name != *default)
    });
    if !custom {
        return;
    }

    out.push_str("schema {\n");
    for (operation, type_ref, _) in roots {
        if let Some(name) = type_ref.and_then(|v| v.get("name")).and_then(Value::as_str) {
            out.push_str(&format!("  {operation}: {name}\n"));
        }
    }
    out.push('}');
}

fn render_type(type_def: &Value, name: &str, out: &mut String) {
    if let Some(description) = type_def
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
    {
        out.push_str(&format!("\"\"\"{description}\"\"\"\n"));
    }

    match str_field(type_def, "kind") {
        "SCALAR" => out.push_str(&format!("scalar {name}")),
        "ENUM" => {
            out.push_str(&format!("enum {name} {{\n"));
            for value in array_field(type_def, "enumValues") {
                out.push_str(&format!("  {}\n", str_field(value, "name")));
            }
            out.push('}');
        }
        "UNION" => {
            let members: Vec<String> = array_field(type_def, "possibleTypes")
                .iter()
                .map(|member| render_type_ref(member))
                .collect();
            out.push_str(&format!("union {name} = {}", members.join(" | ")));
        }
        "INPUT_OBJECT" => {
            out.push_str(&format!("input {name} {{\n"));
            for field in array_field(type_def, "inputFields") {
                out.push_str(&format!("  {}\n", render_input_value(field)));
            }
            out.push('}');
        }
        "INTERFACE" | "OBJECT" => {
            let keyword = if str_field(type_def, "kind") == "OBJECT" {
                "type"
            } else {
                "interface"
            };
            out.push_str(&format!("{keyword} {name}"));
            let interfaces: Vec<String> = array_field(type_def, "interfaces")
                .iter()
                .map(|interface| render_type_ref(interface))
                .collect();
            if !interfaces.is_empty() {
                out.push_str(&format!(" implements {}", interfaces.join(" & ")));
            }
            out.push_str(" {\n");
            for field in array_field(type_def, "fields") {
                out.push_str(&format!("  {}\n", render_field(field)));
            }
            out.push('}');
        }
        other => out.push_str(&format!("# unsupported kind {other}: {name}")),
    }
}

fn render_field(field: &Value) -> String {
    let name = str_field(field, "name");
    let args = array_field(field, "args");
    let rendered_type = render_type_ref(field.get("type").unwrap_or(&Value::Null));
    if args.is_empty() {
        return format!("{name}: {rendered_type}");
    }
    let rendered_args: Vec<String> = args.iter().map(|arg| render_input_value(arg)).collect();
    format!("{name}({}): {rendered_type}", rendered_args.join(", "))
}

fn render_input_value(input: &Value) -> String {
    let name = str_field(input, "name");
    let rendered_type = render_type_ref(input.get("type").unwrap_or(&Value::Null));
    match input.get("defaultValue").and_then(Value::as_str) {
        Some(default) => format!("{name}: {rendered_type} = {default}"),
        None => format!("{name}: {rendered_type}"),
    }
}

fn render_type_ref(type_ref: &Value) -> String {
    match str_field(type_ref, "kind") {
        "NON_NULL" => format!(
            "{}!",
            render_type_ref(type_ref.get("ofType").unwrap_or(&Value::Null))
        ),
        "LIST" => format!(
            "[{}]",
            render_type_ref(type_ref.get("ofType").unwrap_or(&Value::Null))
        ),
        _ => match type_ref.get("name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => "Unknown".to_string(),
        },
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture() -> Value {
        json!({
            "__schema": {
                "queryType": {"name": "Query"},
                "mutationType": null,
                "subscriptionType": null,
                "types": [
                    {
                        "kind": "OBJECT",
                        "name": "Query",
                        "description": "Root query object",
                        "fields": [
                            {
                                "name": "target",
                                "args": [{
                                    "name": "ensemblId",
                                    "type": {
                                        "kind": "NON_NULL",
                                        "name": null,
                                        "ofType": {"kind": "SCALAR", "name": "String"},
                                    },
                                    "defaultValue": null,
                                }],
                                "type": {"kind": "OBJECT", "name": "Target"},
                            },
                            {
                                "name": "targets",
                                "args": [],
                                "type": {
                                    "kind": "NON_NULL",
                                    "name": null,
                                    "ofType": {
                                        "kind": "LIST",
                                        "name": null,
                                        "ofType": {
                                            "kind": "NON_NULL",
                                            "name": null,
                                            "ofType": {"kind": "OBJECT", "name": "Target"},
                                        },
                                    },
                                },
                            },
                        ],
                    },
                    {
                        "kind": "OBJECT",
                        "name": "Target",
                        "fields": [
                            {"name": "id", "args": [], "type": {
                                "kind": "NON_NULL",
                                "name": null,
                                "ofType": {"kind": "SCALAR", "name": "String"},
                            }},
                        ],
                    },
                    {"kind": "SCALAR", "name": "Long"},
                    {
                        "kind": "ENUM",
                        "name": "EntityNames",
                        "enumValues": [{"name": "target"}, {"name": "disease"}, {"name": "drug"}],
                    },
                    {
                        "kind": "INPUT_OBJECT",
                        "name": "Pagination",
                        "inputFields": [
                            {"name": "index", "type": {"kind": "SCALAR", "name": "Int"}, "defaultValue": "0"},
                            {"name": "size", "type": {"kind": "SCALAR", "name": "Int"}, "defaultValue": null},
                        ],
                    },
                    {
                        "kind": "UNION",
                        "name": "EntityUnionType",
                        "possibleTypes": [
                            {"kind": "OBJECT", "name": "Target"},
                            {"kind": "OBJECT", "name": "Disease"},
                        ],
                    },
                    {"kind": "OBJECT", "name": "__Type", "fields": []},
                ],
            }
        })
    }

    #[test]
    fn renders_the_platform_shapes() {
        let sdl = render_sdl(&fixture()).expect("renders");
        assert!(sdl.contains("type Query {"), "got:\n{sdl}");
        assert!(sdl.contains("target(ensemblId: String!): Target"));
        assert!(sdl.contains("targets: [Target!]!"));
        assert!(sdl.contains("scalar Long"));
        assert!(sdl.contains("enum EntityNames {"));
        assert!(sdl.contains("input Pagination {"));
        assert!(sdl.contains("index: Int = 0"));
        assert!(sdl.contains("union EntityUnionType = Target | Disease"));
        assert!(sdl.contains("\"\"\"Root query object\"\"\""));
    }

    #[test]
    fn introspection_machinery_is_omitted() {
        let sdl = render_sdl(&fixture()).expect("renders");
        assert!(!sdl.contains("__Type"));
        // Default root names need no schema block.
        assert!(!sdl.contains("schema {"));
    }

    #[test]
    fn custom_root_names_emit_a_schema_block() {
        let data = json!({
            "__schema": {
                "queryType": {"name": "RootQuery"},
                "types": [
                    {"kind": "OBJECT", "name": "RootQuery", "fields": []},
                ],
            }
        });
        let sdl = render_sdl(&data).expect("renders");
        assert!(sdl.contains("schema {\n  query: RootQuery\n}"));
    }

    #[test]
    fn missing_schema_root_is_an_error() {
        let err = render_sdl(&json!({"data": {}})).unwrap_err();
        assert!(err.to_string().contains("__schema"));
    }
}
