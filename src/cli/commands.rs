use clap::Subcommand;

use super::classify::ClassifyArgs;
use super::decode::DecodeArgs;
use super::features::FeaturesArgs;
use super::replay::ReplayArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Decode the gcs/gcd consent parameters of a request URL or query string
    Decode(DecodeArgs),

    /// Classify a URL as a GTM debugging surface
    Classify(ClassifyArgs),

    /// Show the features selected for an environment
    Features(FeaturesArgs),

    /// Replay navigation, page and message events through the coordinator
    Replay(ReplayArgs),
}
