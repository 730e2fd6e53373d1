use anyhow::Result;
use clap::{Args, ValueEnum};
use gtm_lens_consent_codec::{ConsentCategory, ConsentRecord, ConsentReport, LegacyLayout};

use super::context::CliContext;
use super::output::emit;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LayoutArg {
    /// `G1` followed by ad_storage and analytics_storage flags
    TwoCategory,
    /// Whole-value table covering all four categories
    FourCategory,
}

impl From<LayoutArg> for LegacyLayout {
    fn from(value: LayoutArg) -> Self {
        match value {
            LayoutArg::TwoCategory => LegacyLayout::TwoCategory,
            LayoutArg::FourCategory => LegacyLayout::FourCategoryTable,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct DecodeArgs {
    /// Request URL, query string or message title containing gcs= / gcd=
    pub text: String,

    /// How to read gcs= values
    #[arg(long, value_enum, default_value = "four-category")]
    pub layout: LayoutArg,
}

pub fn cmd_decode(args: DecodeArgs, ctx: &CliContext) -> Result<()> {
    let report = ConsentReport::from_text(&args.text, args.layout.into());
    emit(ctx.output(), &report, render)
}

fn render(report: &ConsentReport) -> String {
    if report.is_empty() {
        return "no consent parameters found".to_string();
    }
    let mut lines = Vec::new();
    if let Some(raw) = &report.params.gcs {
        lines.push(format!("gcs={raw}"));
    }
    if let Some(raw) = &report.params.gcd {
        lines.push(format!("gcd={raw}"));
    }
    lines.push(table(&report.merged()));
    lines.join("\n")
}

fn table(record: &ConsentRecord) -> String {
    let mut lines = vec![format!("{:<20} {:<10} {:<10}", "Type", "Default", "Update")];
    for category in ConsentCategory::ALL {
        let entry = record.entry(category);
        lines.push(format!(
            "{:<20} {:<10} {:<10}",
            category.as_str(),
            entry.default.label(),
            entry.update.label()
        ));
    }
    lines.join("\n")
}
