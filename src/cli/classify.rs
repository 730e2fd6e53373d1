use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use gtm_lens_core_types::{InjectionMode, TabId};
use gtm_lens_env_classifier::{
    EnvironmentClassifier, Header, NavigationEvent, PageProbe, ProbeError, ResponseEvent, TabState,
};
use serde::Serialize;

use super::context::CliContext;
use super::output::emit;

const TAB: TabId = TabId(1);

#[derive(Args, Clone, Debug)]
pub struct ClassifyArgs {
    /// Page URL
    #[arg(long)]
    pub url: String,

    /// Set-Cookie value seen on the main-frame response, e.g. "gtm_debug=1; Path=/"
    #[arg(long = "cookie", value_name = "SET_COOKIE")]
    pub cookies: Vec<String>,

    /// Pretend the page exposes the preview bootstrap global
    #[arg(long)]
    pub marker: bool,
}

/// Probe answering from the command line.
struct FixedProbe {
    found: bool,
}

#[async_trait]
impl PageProbe for FixedProbe {
    async fn probe_global(
        &self,
        _tab: TabId,
        _marker: &str,
        _mode: InjectionMode,
    ) -> Result<bool, ProbeError> {
        Ok(self.found)
    }
}

#[derive(Serialize)]
struct ClassifyReport {
    url: String,
    state: Option<TabState>,
}

pub async fn cmd_classify(args: ClassifyArgs, ctx: &CliContext) -> Result<()> {
    let probe = Arc::new(FixedProbe { found: args.marker });
    let (classifier, _events) =
        EnvironmentClassifier::with_config(ctx.config().classifier.clone(), probe);

    if !args.cookies.is_empty() {
        let headers = args
            .cookies
            .iter()
            .map(|value| Header {
                name: "Set-Cookie".to_string(),
                value: value.clone(),
            })
            .collect();
        classifier
            .on_response(ResponseEvent {
                tab: TAB,
                url: args.url.clone(),
                is_main_frame: true,
                headers,
            })
            .await?;
    }
    classifier
        .on_navigation(NavigationEvent {
            tab: TAB,
            url: args.url.clone(),
            is_main_frame: true,
        })
        .await?;

    let report = ClassifyReport {
        url: args.url,
        state: classifier.tab_state(TAB),
    };
    emit(ctx.output(), &report, |report| match &report.state {
        Some(state) => format!(
            "{}: {} ({:?})",
            report.url, state.environment, state.evidence
        ),
        None => format!("{}: not a GTM debugging surface", report.url),
    })
}
