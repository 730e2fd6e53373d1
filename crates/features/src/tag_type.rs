//! Vendor colouring of tag cards, keyed on the card subtitle (the tag type).

use std::sync::Arc;
use std::time::Duration;

use gtm_lens_dom_reconciler::{
    Dom, DomJournal, EnhanceError, Enhancer, NodeId, Outcome, ReconcilerSpec, Selector,
};
use gtm_lens_policy_center::defaults::TAGS_TYPE_COLORING;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::errors::FeatureError;
use crate::feature::ReconciledFeature;
use crate::markup::{child_text, class_name};
use crate::style::StyleSheet;

pub const CARD_SELECTOR: &str = "tags-tab .gtm-debug-card";
pub const SUBTITLE_SELECTOR: &str = ".gtm-debug-card__subtitle";
const STYLE_ID: &str = "gtm-lens-tag-type-styles";

/// `(pattern, vendor, color, icon)`; first match wins.
const VENDORS: [(&str, &str, &str, &str); 10] = [
    (
        r"(?i)Google Tag|Google Analytics",
        "google",
        "#EEA849",
        "https://www.google.com/favicon.ico",
    ),
    (r"(?i)Data Tag|Stape", "stape", "#FF6D34", "https://stape.io/favicon.ico"),
    (
        r"(?i)Google Ads|Microsoft Ads|Floodlight|Conversion Linker",
        "google-ads",
        "#3CA55C",
        "https://www.google.com/favicon.ico",
    ),
    (r"(?i)Pinterest", "pinterest", "#92140C", "https://pinterest.com/favicon.ico"),
    (r"(?i)Facebook|Meta", "facebook", "#0072FF", "https://facebook.com/favicon.ico"),
    (r"(?i)TikTok", "tiktok", "#333333", "https://tiktok.com/favicon.ico"),
    (r"(?i)BigQuery", "bigquery", "#5086EC", "https://cloud.google.com/favicon.ico"),
    (r"(?i)LinkedIn", "linkedin", "#006699", "https://linkedin.com/favicon.ico"),
    (
        r"(?i)Snapchat|Snap Pixel",
        "snapchat",
        "#FFD60A",
        "https://snapchat.com/favicon.ico",
    ),
    (r"(?i)Klaviyo", "klaviyo", "#1D1E20", "https://klaviyo.com/favicon.ico"),
];

#[derive(Debug)]
pub struct VendorRule {
    pub vendor: &'static str,
    pub color: &'static str,
    pub icon: &'static str,
    pattern: Regex,
}

impl VendorRule {
    pub fn class(&self) -> String {
        class_name(&format!("border-{}", self.vendor))
    }
}

static VENDOR_RULES: Lazy<Vec<VendorRule>> = Lazy::new(|| {
    VENDORS
        .iter()
        .filter_map(|&(pattern, vendor, color, icon)| match Regex::new(pattern) {
            Ok(pattern) => Some(VendorRule {
                vendor,
                color,
                icon,
                pattern,
            }),
            Err(err) => {
                warn!(target: "gtm_lens::features", vendor, error = %err, "vendor pattern rejected");
                None
            }
        })
        .collect()
});

pub fn vendor_rules() -> &'static [VendorRule] {
    &VENDOR_RULES
}

pub fn vendor_for(tag_type: &str) -> Option<&'static VendorRule> {
    vendor_rules()
        .iter()
        .find(|rule| rule.pattern.is_match(tag_type))
}

struct TagTypeColoring {
    subtitle: Selector,
}

impl Enhancer for TagTypeColoring {
    fn enhance(
        &self,
        dom: &dyn Dom,
        node: NodeId,
        journal: &mut DomJournal,
    ) -> Result<Outcome, EnhanceError> {
        let Some(rule) = child_text(dom, node, &self.subtitle).and_then(|text| vendor_for(&text))
        else {
            return Ok(Outcome::Skipped);
        };
        journal.add_class(dom, node, &rule.class())?;
        Ok(Outcome::Enhanced)
    }

    fn fingerprint(&self, dom: &dyn Dom, node: NodeId) -> Option<String> {
        child_text(dom, node, &self.subtitle)
    }
}

fn stylesheet() -> StyleSheet {
    let css = vendor_rules()
        .iter()
        .map(|rule| {
            let class = rule.class();
            format!(
                ".{class} {{ border-left: 4px solid {color} !important; }}\n\
                 .{class} .gtm-debug-card__title::before {{ content: \"\"; display: inline-block; width: 16px; height: 16px; margin-right: 6px; vertical-align: middle; background-image: url({icon}); background-size: contain; background-repeat: no-repeat; }}",
                color = rule.color,
                icon = rule.icon,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    StyleSheet::new(STYLE_ID, css)
}

pub fn build(dom: Arc<dyn Dom>, debounce: Duration) -> Result<ReconciledFeature, FeatureError> {
    let spec = ReconcilerSpec::new(TAGS_TYPE_COLORING, CARD_SELECTOR)?.with_debounce(debounce);
    let enhancer = TagTypeColoring {
        subtitle: Selector::parse(SUBTITLE_SELECTOR)?,
    };
    Ok(ReconciledFeature::new(TAGS_TYPE_COLORING, dom)
        .with_style(stylesheet())
        .with_part(spec, Arc::new(enhancer)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_vendor_pattern_compiles() {
        assert_eq!(vendor_rules().len(), VENDORS.len());
    }

    #[test]
    fn first_matching_vendor_wins() {
        assert_eq!(vendor_for("Google Analytics: GA4 Event").map(|r| r.vendor), Some("google"));
        assert_eq!(vendor_for("stape data tag").map(|r| r.vendor), Some("stape"));
        assert_eq!(
            vendor_for("Google Ads Conversion Tracking").map(|r| r.vendor),
            Some("google-ads")
        );
        assert_eq!(vendor_for("Meta Conversions API").map(|r| r.vendor), Some("facebook"));
        assert!(vendor_for("Custom HTML").is_none());
    }

    #[test]
    fn vendor_class_uses_prefix() {
        let rule = vendor_for("TikTok Events API").unwrap();
        assert_eq!(rule.class(), "gtm-lens-border-tiktok");
    }
}
