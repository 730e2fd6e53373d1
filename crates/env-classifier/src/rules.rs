//! Static signal matching: origins and debug cookies.

use gtm_lens_core_types::Environment;
use tracing::warn;
use url::Url;

use crate::config::{ClassifierConfig, OriginRule};
use crate::{Header, SET_COOKIE};

#[derive(Clone, Debug, PartialEq, Eq)]
struct CompiledOrigin {
    scheme: String,
    host: String,
    port: Option<u16>,
    environment: Environment,
}

/// Origin table compiled once from configuration. Unparseable entries are dropped with a warning.
#[derive(Clone, Debug, Default)]
pub struct OriginRules {
    rules: Vec<CompiledOrigin>,
}

impl OriginRules {
    pub fn compile(rules: &[OriginRule]) -> Self {
        let rules = rules
            .iter()
            .filter_map(|rule| match Url::parse(&rule.origin) {
                Ok(parsed) => parsed.host_str().map(|host| CompiledOrigin {
                    scheme: parsed.scheme().to_string(),
                    host: host.to_ascii_lowercase(),
                    port: parsed.port_or_known_default(),
                    environment: rule.environment,
                }),
                Err(err) => {
                    warn!(
                        target: "gtm_lens::classifier",
                        origin = %rule.origin,
                        error = %err,
                        "ignoring invalid origin rule"
                    );
                    None
                }
            })
            .collect();
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Exact scheme + host + port comparison; the first matching rule wins.
    pub fn match_url(&self, raw: &str) -> Option<Environment> {
        let parsed = Url::parse(raw).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        let port = parsed.port_or_known_default();
        self.rules
            .iter()
            .find(|rule| rule.scheme == parsed.scheme() && rule.host == host && rule.port == port)
            .map(|rule| rule.environment)
    }
}

/// Cookie names from every `Set-Cookie` header. Some hosts fold several cookies into one header
/// value separated by newlines.
pub fn set_cookie_names(headers: &[Header]) -> Vec<String> {
    headers
        .iter()
        .filter(|header| header.name.eq_ignore_ascii_case(SET_COOKIE))
        .flat_map(|header| header.value.split('\n'))
        .filter_map(|line| {
            let pair = line.split(';').next()?;
            let (name, _) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

pub fn has_debug_cookie(headers: &[Header], config: &ClassifierConfig) -> bool {
    set_cookie_names(headers).iter().any(|name| {
        let name = name.to_ascii_lowercase();
        config
            .cookie_prefixes
            .iter()
            .any(|prefix| name.starts_with(&prefix.to_ascii_lowercase()))
    })
}
