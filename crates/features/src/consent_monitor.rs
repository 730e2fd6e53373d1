//! Consent table for the selected `collect` request in the server-side preview.

use std::sync::Arc;
use std::time::Duration;

use gtm_lens_consent_codec::{ConsentRecord, ConsentReport, ConsentState, LegacyLayout};
use gtm_lens_dom_reconciler::{
    Dom, DomError, DomJournal, EnhanceError, Enhancer, NodeId, ObserveOptions, Outcome,
    ReconcilerSpec, Selector,
};
use gtm_lens_policy_center::defaults::CONSENT_STATUS_MONITOR;

use crate::errors::FeatureError;
use crate::feature::ReconciledFeature;
use crate::markup::{append_all, class_name, element, text_element};
use crate::style::StyleSheet;

pub const SELECTOR: &str =
    ".message-list__group .message-list__row--child-selected .wd-debug-message-title";
pub const ANCHOR_SELECTOR: &str = ".blg-card-tabs";
const STYLE_ID: &str = "gtm-lens-consent-styles";

/// Decodes the consent parameters of a message title such as `collect?v=2&gcs=G111`.
/// Titles of other requests yield `None`.
pub fn consent_from_title(title: &str) -> Option<ConsentRecord> {
    let title = title.trim();
    if !title.starts_with("collect") || !title.contains("v=2") {
        return None;
    }
    let report = ConsentReport::from_text(title, LegacyLayout::FourCategoryTable);
    if report.is_empty() {
        return None;
    }
    Some(report.merged())
}

fn state_cell(dom: &dyn Dom, state: ConsentState) -> Result<NodeId, DomError> {
    let cell = element(dom, "td", &[("class", "gtm-debug-table-cell")])?;
    let wrapper = element(dom, "div", &[("class", "consent-value-cell")])?;
    let class = format!("consent {}", state.css_class());
    let value = text_element(dom, "div", &[("class", class.as_str())], state.label())?;
    dom.append_child(wrapper, value)?;
    dom.append_child(cell, wrapper)?;
    Ok(cell)
}

fn render(dom: &dyn Dom, record: &ConsentRecord) -> Result<NodeId, DomError> {
    let table_class = format!("gtm-debug-consent-table {}", class_name("consent-table"));
    let table = element(dom, "table", &[("class", table_class.as_str())])?;
    let thead = element(dom, "thead", &[])?;
    let header = element(dom, "tr", &[("class", "gtm-debug-table-row")])?;
    for label in ["Type", "On-page Default", "On-page Update"] {
        let th = text_element(dom, "th", &[("class", "gtm-debug-table-header-cell")], label)?;
        dom.append_child(header, th)?;
    }
    dom.append_child(thead, header)?;

    let tbody = element(dom, "tbody", &[])?;
    for (category, entry) in record.iter() {
        let row = element(dom, "tr", &[("class", "gtm-debug-table-row")])?;
        let name = text_element(dom, "td", &[("class", "gtm-debug-table-cell")], category.as_str())?;
        let default = state_cell(dom, entry.default)?;
        let update = state_cell(dom, entry.update)?;
        append_all(dom, row, &[name, default, update])?;
        dom.append_child(tbody, row)?;
    }
    append_all(dom, table, &[thead, tbody])?;
    Ok(table)
}

struct ConsentStatusMonitor {
    anchor: Selector,
}

impl Enhancer for ConsentStatusMonitor {
    fn enhance(
        &self,
        dom: &dyn Dom,
        node: NodeId,
        journal: &mut DomJournal,
    ) -> Result<Outcome, EnhanceError> {
        let Some(record) = dom.attribute(node, "title").as_deref().and_then(consent_from_title)
        else {
            return Ok(Outcome::Skipped);
        };
        let Some(anchor) = dom.query_first(dom.document(), &self.anchor) else {
            return Ok(Outcome::Skipped);
        };
        let table = render(dom, &record)?;
        journal.insert_after(dom, anchor, table)?;
        Ok(Outcome::Enhanced)
    }

    fn fingerprint(&self, dom: &dyn Dom, node: NodeId) -> Option<String> {
        dom.attribute(node, "title")
    }
}

fn stylesheet() -> StyleSheet {
    let class = class_name("consent-table");
    StyleSheet::new(
        STYLE_ID,
        format!(
            ".{class} {{ border: 1px solid #e0e0e0 !important; border-collapse: collapse !important; }}\n\
             .{class} th, .{class} td {{ border: 1px solid #e0e0e0 !important; }}"
        ),
    )
}

pub fn build(dom: Arc<dyn Dom>, debounce: Duration) -> Result<ReconciledFeature, FeatureError> {
    let spec = ReconcilerSpec::new(CONSENT_STATUS_MONITOR, SELECTOR)?
        .with_observe(ObserveOptions::default().with_attributes(&["class", "title"]))
        .with_debounce(debounce);
    let enhancer = ConsentStatusMonitor {
        anchor: Selector::parse(ANCHOR_SELECTOR)?,
    };
    Ok(ReconciledFeature::new(CONSENT_STATUS_MONITOR, dom)
        .with_style(stylesheet())
        .with_part(spec, Arc::new(enhancer)))
}
