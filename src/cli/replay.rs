use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use gtm_lens_cli::{load_script, replay, Coordinator, ReplayOptions, ReplayReport};
use gtm_lens_env_classifier::NoopProbe;
use gtm_lens_extensions_bridge::{MemoryPageInjector, PageInjector};

use super::context::CliContext;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct ReplayArgs {
    /// JSON file holding the event script
    pub script: PathBuf,

    /// Include each tab's final markup in the report
    #[arg(long)]
    pub html: bool,

    /// Wait after each page mutation, in milliseconds
    #[arg(long, default_value_t = 300)]
    pub settle_ms: u64,
}

pub async fn cmd_replay(args: ReplayArgs, ctx: &CliContext) -> Result<()> {
    let events = load_script(&args.script)
        .with_context(|| format!("Failed to load {}", args.script.display()))?;
    let pages = Arc::new(MemoryPageInjector::new());
    let (coordinator, _events) = Coordinator::from_config(
        ctx.config(),
        Arc::new(NoopProbe),
        Arc::clone(&pages) as Arc<dyn PageInjector>,
    )?;
    let options = ReplayOptions {
        settle: Duration::from_millis(args.settle_ms),
        include_html: args.html,
    };
    let report = replay(&coordinator, &pages, events, options).await?;
    emit(ctx.output(), &report, render)
}

fn render(report: &ReplayReport) -> String {
    let mut lines = vec![format!("{} events replayed", report.events)];
    for tab in &report.tabs {
        let environment = tab
            .state
            .as_ref()
            .map(|state| state.environment.to_string())
            .unwrap_or_else(|| "unclassified".to_string());
        lines.push(format!("{}: {environment}", tab.tab));
        if !tab.features.is_empty() {
            lines.push(format!("  features: {}", tab.features.join(", ")));
        }
        if let Some(html) = &tab.html {
            lines.push(format!("  html: {html}"));
        }
    }
    for response in &report.responses {
        let status = if response.ok { "ok" } else { "error" };
        let detail = match (&response.data, &response.error) {
            (_, Some(error)) => error.clone(),
            (Some(data), None) => data.to_string(),
            (None, None) => String::new(),
        };
        lines.push(format!("response {} {status}: {detail}", response.req_id));
    }
    lines.join("\n")
}
