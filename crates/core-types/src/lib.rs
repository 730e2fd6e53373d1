//! Primitives shared by every gtm-lens crate: tab identity, the debugging surface a tab is
//! showing, and feature keys.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Shared error type for cross-crate boundaries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LensError {
    #[error("{message}")]
    Message { message: String },
}

impl LensError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

/// Browser tab identifier as reported by the host platform.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TabId(pub i64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab:{}", self.0)
    }
}

/// The GTM debugging surface a tab is showing.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Environment {
    /// GTM web console.
    #[cfg_attr(feature = "serde-full", serde(alias = "GTMUI"))]
    ClientUi,
    /// Client-side live debugger.
    #[cfg_attr(feature = "serde-full", serde(alias = "GTMTA"))]
    TagAssistant,
    /// Self-hosted server-side preview.
    #[cfg_attr(feature = "serde-full", serde(alias = "GTMTASS"))]
    ServerSidePreview,
}

impl Environment {
    pub const ALL: [Environment; 3] = [
        Environment::ClientUi,
        Environment::TagAssistant,
        Environment::ServerSidePreview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::ClientUi => "client_ui",
            Environment::TagAssistant => "tag_assistant",
            Environment::ServerSidePreview => "server_side_preview",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = LensError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "client_ui" | "client-ui" | "GTMUI" => Ok(Environment::ClientUi),
            "tag_assistant" | "tag-assistant" | "GTMTA" => Ok(Environment::TagAssistant),
            "server_side_preview" | "server-side-preview" | "GTMTASS" => {
                Ok(Environment::ServerSidePreview)
            }
            other => Err(LensError::new(format!("unknown environment: {other}"))),
        }
    }
}

/// How script is placed into a page. `MainWorld` is tried first; `ScriptElement` is the single
/// fallback used when the page's CSP rejects the first attempt.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum InjectionMode {
    MainWorld,
    ScriptElement,
}

impl InjectionMode {
    pub fn fallback(&self) -> Option<InjectionMode> {
        match self {
            InjectionMode::MainWorld => Some(InjectionMode::ScriptElement),
            InjectionMode::ScriptElement => None,
        }
    }
}

/// Settings key of an augmentation feature, e.g. `tags-type-coloring`.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde-full", serde(transparent))]
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FeatureId(pub String);

impl FeatureId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeatureId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
