//! Request/response envelopes exchanged between the popup, the page and the background
//! coordinator.

use std::fmt;

use gtm_lens_core_types::{FeatureId, TabId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::BridgeError;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BridgeRequest {
    #[serde(default = "Uuid::new_v4")]
    pub req_id: Uuid,
    pub command: String,
    #[serde(default)]
    pub payload: Value,
}

impl BridgeRequest {
    pub fn new(command: impl Into<String>, payload: Value) -> Self {
        Self {
            req_id: Uuid::new_v4(),
            command: command.into(),
            payload,
        }
    }

    pub fn from_command(command: &BridgeCommand) -> Result<Self, BridgeError> {
        let value =
            serde_json::to_value(command).map_err(|err| BridgeError::Internal(err.to_string()))?;
        let name = value
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let payload = value.get("payload").cloned().unwrap_or(Value::Null);
        Ok(Self::new(name, payload))
    }

    pub fn parse(&self) -> Result<BridgeCommand, BridgeError> {
        if !BridgeCommand::NAMES.contains(&self.command.as_str()) {
            return Err(BridgeError::UnknownCommand(self.command.clone()));
        }
        let envelope = json!({ "command": self.command, "payload": self.payload });
        serde_json::from_value(envelope).map_err(|err| BridgeError::InvalidPayload {
            command: self.command.clone(),
            reason: err.to_string(),
        })
    }
}

/// Typed form of a [`BridgeRequest`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", content = "payload", rename_all = "kebab-case")]
pub enum BridgeCommand {
    GetEnvironment {
        tab: TabId,
    },
    ToggleFeature {
        tab: TabId,
        feature: FeatureId,
        enabled: bool,
    },
    FeatureCommand {
        tab: TabId,
        feature: FeatureId,
        command: String,
        #[serde(default)]
        payload: Value,
    },
    ListFeatures {
        tab: TabId,
    },
}

impl BridgeCommand {
    pub const NAMES: [&'static str; 4] = [
        "get-environment",
        "toggle-feature",
        "feature-command",
        "list-features",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BridgeCommand::GetEnvironment { .. } => "get-environment",
            BridgeCommand::ToggleFeature { .. } => "toggle-feature",
            BridgeCommand::FeatureCommand { .. } => "feature-command",
            BridgeCommand::ListFeatures { .. } => "list-features",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BridgeResponse {
    pub req_id: Uuid,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BridgeResponse {
    pub fn success(req_id: Uuid, data: Value) -> Self {
        Self {
            req_id,
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(req_id: Uuid, error: impl fmt::Display) -> Self {
        Self {
            req_id,
            ok: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_feature_command_with_nested_payload() {
        let request = BridgeRequest::new(
            "feature-command",
            json!({
                "tab": 7,
                "feature": "preview-ui-filtering",
                "command": "set-filter",
                "payload": {"query": "ga4"}
            }),
        );
        match request.parse().unwrap() {
            BridgeCommand::FeatureCommand {
                tab,
                feature,
                command,
                payload,
            } => {
                assert_eq!(tab, TabId(7));
                assert_eq!(feature.as_str(), "preview-ui-filtering");
                assert_eq!(command, "set-filter");
                assert_eq!(payload["query"], "ga4");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_commands_and_bad_payloads_are_distinguished() {
        let unknown = BridgeRequest::new("reload", Value::Null);
        assert!(matches!(
            unknown.parse(),
            Err(BridgeError::UnknownCommand(name)) if name == "reload"
        ));

        let bad = BridgeRequest::new("toggle-feature", json!({"tab": 1}));
        assert!(matches!(bad.parse(), Err(BridgeError::InvalidPayload { .. })));
    }

    #[test]
    fn typed_command_round_trips_through_envelope() {
        let command = BridgeCommand::ToggleFeature {
            tab: TabId(3),
            feature: FeatureId::new("urls-formatter"),
            enabled: false,
        };
        let request = BridgeRequest::from_command(&command).unwrap();
        assert_eq!(request.command, "toggle-feature");
        assert_eq!(request.payload["enabled"], false);
        assert_eq!(request.parse().unwrap(), command);
    }

    #[test]
    fn failure_response_omits_data() {
        let response = BridgeResponse::failure(Uuid::nil(), "boom");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"], "boom");
        assert!(value.get("data").is_none());
    }
}
