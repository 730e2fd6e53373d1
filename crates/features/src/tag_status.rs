use std::sync::Arc;
use std::time::Duration;

use gtm_lens_dom_reconciler::{
    Dom, DomJournal, EnhanceError, Enhancer, NodeId, ObserveOptions, Outcome, ReconcilerSpec,
};
use gtm_lens_policy_center::defaults::TAGS_STATUS_COLORING;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::FeatureError;
use crate::feature::ReconciledFeature;
use crate::markup::class_name;
use crate::style::StyleSheet;
use crate::tag_type::CARD_SELECTOR;

const STYLE_ID: &str = "gtm-lens-tag-status-styles";

static FAILED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)failed").expect("failed status pattern is valid"));

pub fn is_failed(card_text: &str) -> bool {
    FAILED.is_match(card_text)
}

pub fn failed_class() -> String {
    class_name("status-failed")
}

struct TagStatusColoring;

impl Enhancer for TagStatusColoring {
    fn enhance(
        &self,
        dom: &dyn Dom,
        node: NodeId,
        journal: &mut DomJournal,
    ) -> Result<Outcome, EnhanceError> {
        if !is_failed(&dom.text_content(node)) {
            return Ok(Outcome::Skipped);
        }
        journal.add_class(dom, node, &failed_class())?;
        Ok(Outcome::Enhanced)
    }

    fn fingerprint(&self, dom: &dyn Dom, node: NodeId) -> Option<String> {
        Some(is_failed(&dom.text_content(node)).to_string())
    }
}

fn stylesheet() -> StyleSheet {
    let class = failed_class();
    StyleSheet::new(
        STYLE_ID,
        format!(
            ".{class} .gtm-debug-card__subtitle::before {{ content: \"\\26A0\"; display: inline-block; font-size: 14px; }}\n\
             .{class} .gtm-debug-card__subtitle {{ background-color: #dc354599 !important; color: white !important; }}"
        ),
    )
}

pub fn build(dom: Arc<dyn Dom>, debounce: Duration) -> Result<ReconciledFeature, FeatureError> {
    let spec = ReconcilerSpec::new(TAGS_STATUS_COLORING, CARD_SELECTOR)?
        .with_observe(ObserveOptions::default().with_character_data())
        .with_debounce(debounce);
    Ok(ReconciledFeature::new(TAGS_STATUS_COLORING, dom)
        .with_style(stylesheet())
        .with_part(spec, Arc::new(TagStatusColoring)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_match_is_case_insensitive() {
        assert!(is_failed("GA4 Event  Failed"));
        assert!(is_failed("status: FAILED"));
        assert!(!is_failed("Succeeded"));
        assert!(!is_failed(""));
        assert_eq!(failed_class(), "gtm-lens-status-failed");
    }
}
