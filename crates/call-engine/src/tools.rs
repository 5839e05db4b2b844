//! The tool gateway: schema projection and the PIN gate.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{CallerProfile, ToolCatalog, ToolSpec};
use crate::error::Error;
use crate::ha::HaClient;

/// Schema description for the synthesized `pin` parameter. Phrased so
/// the assistant elicits the code verbally and converts it to an
/// integer before calling again.
const PIN_PARAM_DESCRIPTION: &str = "Numeric authentication code as an integer. The caller \
speaks it digit by digit (for example 'one one eight three three' means 11833); convert the \
spoken digits to a single integer.";

/// Instruction addendum used when any granted tool is PIN-gated.
const PIN_GUIDANCE: &str = "\n\nSome actions require a numeric PIN code. When such a tool \
call fails with PIN_REQUIRED, ask the caller for their PIN code, listen to the spoken \
digits, convert them to an integer of any length, and repeat the tool call with the pin \
argument included. If the result is PIN_INCORRECT, say so and let the caller try again.";

/// Projects the catalog to the assistant and executes invocations.
pub struct ToolGateway {
    catalog: Arc<ToolCatalog>,
    ha: Arc<HaClient>,
}

impl ToolGateway {
    pub fn new(catalog: Arc<ToolCatalog>, ha: Arc<HaClient>) -> Self {
        Self { catalog, ha }
    }

    /// Wire-schema definitions for the tools granted to one caller.
    /// Unknown names in the grant list are skipped.
    pub fn definitions(&self, granted: &[String]) -> Vec<Value> {
        granted
            .iter()
            .filter_map(|name| {
                let spec = self.catalog.get(name)?;
                Some(project_tool(name, spec))
            })
            .collect()
    }

    /// Whether any granted tool needs the PIN instruction addendum.
    pub fn pin_guidance(&self, granted: &[String]) -> Option<&'static str> {
        let gated = granted
            .iter()
            .any(|name| self.catalog.get(name).is_some_and(|t| t.requires_pin));
        gated.then_some(PIN_GUIDANCE)
    }

    /// Execute one invocation and wrap the outcome for the assistant.
    ///
    /// Gate order: unknown tool, missing pin, malformed pin, no code
    /// configured, wrong code. No controller request leaves the house
    /// unless every gate passes, and the `pin` argument never reaches
    /// the controller.
    pub async fn invoke(&self, profile: &CallerProfile, name: &str, arguments: Value) -> Value {
        let Some(spec) = self.catalog.get(name) else {
            warn!(tool = name, "unknown tool invoked");
            return json!({ "success": false, "error": "unknown tool" });
        };

        let mut args = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                warn!(tool = name, ?other, "non-object tool arguments");
                Map::new()
            }
        };

        if spec.requires_pin {
            if let Some(failure) = check_pin(&mut args, profile) {
                return failure;
            }
        }

        let Some((domain, service)) = spec.ha_service.split_once('.') else {
            return json!({
                "success": false,
                "error": format!("invalid ha_service route: {}", spec.ha_service),
            });
        };

        let body = service_body(spec, domain, args);
        info!(tool = name, domain, service, "executing tool");
        match self.ha.call_service(domain, service, &Value::Object(body)).await {
            Ok(result) => json!({ "success": true, "result": result }),
            Err(Error::ControllerStatus { status, body }) => json!({
                "success": false,
                "error": format!("controller returned {status}"),
                "message": body,
            }),
            Err(e) => json!({ "success": false, "error": e.to_string() }),
        }
    }
}

fn project_tool(name: &str, spec: &ToolSpec) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for (param_name, param) in &spec.parameters {
        let mut schema = Map::new();
        schema.insert("type".into(), Value::String(param.kind.clone()));
        schema.insert("description".into(), Value::String(param.description.clone()));
        if let Some(allowed) = &param.allowed {
            schema.insert("enum".into(), Value::Array(allowed.clone()));
        }
        properties.insert(param_name.clone(), Value::Object(schema));
        if param.required {
            required.push(Value::String(param_name.clone()));
        }
    }

    if spec.requires_pin {
        // Optional on purpose: the assistant asks for it when the
        // gate answers PIN_REQUIRED.
        properties.insert(
            "pin".into(),
            json!({ "type": "integer", "description": PIN_PARAM_DESCRIPTION }),
        );
    }

    let mut parameters = Map::new();
    parameters.insert("type".into(), Value::String("object".into()));
    parameters.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        parameters.insert("required".into(), Value::Array(required));
    }

    json!({
        "type": "function",
        "name": name,
        "description": spec.description,
        "parameters": Value::Object(parameters),
    })
}

/// Run the PIN gate against the arguments. On success the `pin` key
/// is removed; on failure the structured error result is returned.
fn check_pin(args: &mut Map<String, Value>, profile: &CallerProfile) -> Option<Value> {
    let Some(provided) = args.get("pin") else {
        return Some(json!({
            "success": false,
            "error": "PIN_REQUIRED",
            "message": "Please provide your PIN code to proceed with this action.",
        }));
    };

    // The schema declares an integer, but the assistant occasionally
    // sends the spoken digits as a string.
    let provided = match coerce_pin(provided) {
        Some(value) => value,
        None => {
            return Some(json!({
                "success": false,
                "error": "PIN_INCORRECT",
                "message": "The PIN format is invalid. Please provide your PIN as a number.",
            }))
        }
    };

    let Some(expected) = profile.pin else {
        return Some(json!({
            "success": false,
            "error": "PIN_NOT_CONFIGURED",
            "message": "This action requires a PIN, but no PIN is configured for your \
                        phone number. The action cannot be performed.",
        }));
    };

    if provided != expected {
        warn!("PIN mismatch");
        return Some(json!({
            "success": false,
            "error": "PIN_INCORRECT",
            "message": "The PIN you provided is incorrect. Please try again.",
        }));
    }

    args.remove("pin");
    None
}

fn coerce_pin(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Assemble the controller body: declared parameters only, plus
/// `entity_id` when present. Scripts address their target by service
/// name, so `entity_id` is suppressed for the script domain.
fn service_body(spec: &ToolSpec, domain: &str, args: Map<String, Value>) -> Map<String, Value> {
    let mut body = Map::new();
    for (key, value) in args {
        if key == "pin" {
            continue;
        }
        if key == "entity_id" {
            if domain != "script" {
                body.insert(key, value);
            }
            continue;
        }
        if spec.parameters.contains_key(&key) {
            body.insert(key, value);
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParamSpec;
    use std::collections::BTreeMap;

    fn spec(requires_pin: bool, params: &[(&str, &str, bool)]) -> ToolSpec {
        let parameters = params
            .iter()
            .map(|(name, kind, required)| {
                (
                    name.to_string(),
                    ParamSpec {
                        kind: kind.to_string(),
                        description: String::new(),
                        allowed: None,
                        required: *required,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();
        ToolSpec {
            description: "test tool".into(),
            ha_service: "script.test".into(),
            requires_pin,
            parameters,
        }
    }

    fn profile_with_pin(pin: Option<i64>) -> CallerProfile {
        CallerProfile {
            pin,
            ..CallerProfile::default()
        }
    }

    #[test]
    fn projection_adds_optional_pin_parameter() {
        let tool = project_tool("open_door", &spec(true, &[]));
        assert_eq!(tool["type"], "function");
        assert_eq!(tool["name"], "open_door");
        assert_eq!(tool["parameters"]["properties"]["pin"]["type"], "integer");
        // pin must never be in the required list.
        assert!(tool["parameters"].get("required").is_none());
    }

    #[test]
    fn projection_lists_required_parameters() {
        let tool = project_tool(
            "set_temperature",
            &spec(false, &[("entity_id", "string", true), ("temperature", "number", true)]),
        );
        let required = tool["parameters"]["required"].as_array().unwrap();
        assert_eq!(required.len(), 2);
        assert!(tool["parameters"].get("properties").unwrap()["pin"].is_null());
    }

    #[test]
    fn missing_pin_is_required_error() {
        let mut args = Map::new();
        args.insert("x".into(), json!(1));
        let failure = check_pin(&mut args, &profile_with_pin(Some(11833))).unwrap();
        assert_eq!(failure["error"], "PIN_REQUIRED");
    }

    #[test]
    fn wrong_pin_is_rejected() {
        let mut args = Map::new();
        args.insert("pin".into(), json!(9999));
        let failure = check_pin(&mut args, &profile_with_pin(Some(11833))).unwrap();
        assert_eq!(failure["error"], "PIN_INCORRECT");
    }

    #[test]
    fn unconfigured_pin_cannot_authenticate() {
        let mut args = Map::new();
        args.insert("pin".into(), json!(11833));
        let failure = check_pin(&mut args, &profile_with_pin(None)).unwrap();
        assert_eq!(failure["error"], "PIN_NOT_CONFIGURED");
    }

    #[test]
    fn correct_pin_is_stripped_from_arguments() {
        let mut args = Map::new();
        args.insert("pin".into(), json!(11833));
        args.insert("keep".into(), json!("yes"));
        assert!(check_pin(&mut args, &profile_with_pin(Some(11833))).is_none());
        assert!(!args.contains_key("pin"));
        assert!(args.contains_key("keep"));
    }

    #[test]
    fn string_pin_is_coerced_to_integer() {
        let mut args = Map::new();
        args.insert("pin".into(), json!("11833"));
        assert!(check_pin(&mut args, &profile_with_pin(Some(11833))).is_none());

        let mut args = Map::new();
        args.insert("pin".into(), json!("one one eight"));
        let failure = check_pin(&mut args, &profile_with_pin(Some(11833))).unwrap();
        assert_eq!(failure["error"], "PIN_INCORRECT");
    }

    #[test]
    fn script_domain_suppresses_entity_id() {
        let mut args = Map::new();
        args.insert("entity_id".into(), json!("script.test"));
        let body = service_body(&spec(true, &[]), "script", args);
        assert!(body.is_empty());
    }

    #[test]
    fn non_script_domain_keeps_entity_id_and_declared_params() {
        let mut args = Map::new();
        args.insert("entity_id".into(), json!("climate.living_room"));
        args.insert("temperature".into(), json!(21.5));
        args.insert("undeclared".into(), json!("dropped"));
        let body = service_body(
            &spec(false, &[("temperature", "number", true)]),
            "climate",
            args,
        );
        assert_eq!(body.get("entity_id").unwrap(), "climate.living_room");
        assert_eq!(body.get("temperature").unwrap(), 21.5);
        assert!(!body.contains_key("undeclared"));
    }
}
