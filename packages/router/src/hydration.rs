//! Data handed over from a render that happened elsewhere, e.g. on a server.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ErrorResponse, RouteError, RouterError};

/// The data of the initial location, as rendered elsewhere.
///
/// The shape matches what a server serializes, so it can be read straight from JSON:
///
/// ```rust
/// # use waymark_router::HydrationState;
/// let hydration: HydrationState = serde_json::from_str(r#"{
///     "loaderData": { "root": { "user": "ada" } },
///     "errors": {
///         "root": { "__type": "RouteErrorResponse", "status": 404, "statusText": "Not Found", "data": null }
///     }
/// }"#).unwrap();
/// assert_eq!(hydration.revive_errors().unwrap()["root"].status(), Some(404));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HydrationState {
    /// Loader data, by route id.
    pub loader_data: BTreeMap<String, Value>,
    /// Action data, by route id.
    pub action_data: Option<BTreeMap<String, Value>>,
    /// Serialized errors, by the id of the boundary that caught them.
    pub errors: Option<BTreeMap<String, Value>>,
    /// The ids of the routes that matched where the data was produced.
    pub matches: Option<Vec<String>>,
}

impl HydrationState {
    /// Turn the serialized errors back into errors.
    ///
    /// Objects tagged `"__type": "RouteErrorResponse"` become [`ErrorResponse`]s, objects tagged
    /// `"__type": "Error"` become errors with their `message`. Anything else is kept as its JSON.
    pub fn revive_errors(&self) -> Option<BTreeMap<String, RouterError>> {
        let errors = self.errors.as_ref()?;
        Some(
            errors
                .iter()
                .map(|(route_id, value)| {
                    let error = RouterError::Loader {
                        route_id: route_id.clone(),
                        source: revive_error(value),
                    };
                    (route_id.clone(), error)
                })
                .collect(),
        )
    }
}

fn revive_error(value: &Value) -> RouteError {
    let field = |name: &str| value.get(name);
    match field("__type").and_then(Value::as_str) {
        Some("RouteErrorResponse") => RouteError::Response(ErrorResponse {
            status: field("status")
                .and_then(Value::as_u64)
                .and_then(|status| u16::try_from(status).ok())
                .unwrap_or(500),
            status_text: field("statusText")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            data: field("data").cloned().unwrap_or_default(),
            internal: field("internal").and_then(Value::as_bool).unwrap_or(false),
        }),
        Some("Error") => {
            let message = field("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            anyhow::anyhow!(message).into()
        }
        _ => anyhow::anyhow!("{value}").into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn revives_every_kind_of_error() {
        let hydration = HydrationState {
            errors: Some(BTreeMap::from([
                ("a".to_string(), json!({ "__type": "Error", "message": "boom" })),
                ("b".to_string(), json!({ "__type": "RouteErrorResponse", "status": 401, "statusText": "Unauthorized", "data": "no", "internal": true })),
                ("c".to_string(), json!("plain")),
            ])),
            ..Default::default()
        };
        let errors = hydration.revive_errors().unwrap();
        assert_eq!(errors["a"].route_error().unwrap().to_string(), "boom");
        assert_eq!(
            errors["b"].route_error(),
            Some(&RouteError::Response(ErrorResponse {
                status: 401,
                status_text: "Unauthorized".into(),
                data: json!("no"),
                internal: true,
            }))
        );
        assert_eq!(errors["c"].route_error().unwrap().to_string(), "\"plain\"");
    }

    #[test]
    fn missing_fields_default() {
        let hydration: HydrationState = serde_json::from_str("{}").unwrap();
        assert_eq!(hydration, HydrationState::default());
        assert_eq!(hydration.revive_errors(), None);
    }
}
