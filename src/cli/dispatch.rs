use super::classify::cmd_classify;
use super::decode::cmd_decode;
use super::env::CliArgs;
use super::features::cmd_features;
use super::replay::cmd_replay;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Decode(args) => cmd_decode(args, ctx),
        Commands::Classify(args) => cmd_classify(args, ctx).await,
        Commands::Features(args) => cmd_features(args, ctx).await,
        Commands::Replay(args) => cmd_replay(args, ctx).await,
    }
}
