use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use gtm_lens_cli::Coordinator;
use gtm_lens_core_types::Environment;
use gtm_lens_env_classifier::NoopProbe;
use gtm_lens_extensions_bridge::MemoryPageInjector;
use gtm_lens_policy_center::{Selection, SettingsSource};

use super::context::CliContext;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct FeaturesArgs {
    /// Environment to select for (client_ui, tag_assistant, server_side_preview)
    #[arg(long = "env")]
    pub environment: Environment,
}

pub async fn cmd_features(args: FeaturesArgs, ctx: &CliContext) -> Result<()> {
    let (coordinator, _events) = Coordinator::from_config(
        ctx.config(),
        Arc::new(NoopProbe),
        Arc::new(MemoryPageInjector::new()),
    )?;
    let selection = coordinator.policy().select(args.environment).await;
    emit(ctx.output(), &selection, render)
}

fn render(selection: &Selection) -> String {
    let source = match selection.source {
        SettingsSource::Store => "stored settings",
        SettingsSource::Fallback => "defaults, no stored settings",
    };
    let mut lines = vec![format!("{} ({source})", selection.environment)];
    if selection.features.is_empty() {
        lines.push("  no features selected".to_string());
    }
    for desc in &selection.features {
        lines.push(format!(
            "  {:>4}  {:<24} {:<22} {:?}",
            desc.order,
            desc.id.as_str(),
            desc.api_key,
            desc.source
        ));
    }
    lines.join("\n")
}
