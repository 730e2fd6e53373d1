//! Search and type filters over the tags and variables tabs of the preview UI.
//!
//! Three reconcilers share one [`FilterState`]: the first inserts the filter bar at the top of
//! `tags-tab` and `variables-tab`, the second hides every tag card the filter rejects (blocked
//! tags included) and the third does the same for variable rows. Paused tags are always hidden.
//! All of them fingerprint on the filter generation, so a `set-filter` command followed by a
//! rescan re-evaluates every claimed element.

use std::sync::Arc;
use std::time::Duration;

use gtm_lens_dom_reconciler::{
    Dom, DomError, DomJournal, EnhanceError, Enhancer, NodeId, ObserveOptions, Outcome,
    ReconcilerSpec, Selector,
};
use gtm_lens_policy_center::defaults::PREVIEW_UI_FILTERING;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FeatureError;
use crate::feature::{CommandHandler, CommandOutcome, ReconciledFeature};
use crate::markup::{append_all, child_text, class_name, element, text_element};
use crate::style::StyleSheet;
use crate::tag_type::SUBTITLE_SELECTOR;

pub const TAB_SELECTOR: &str = "tags-tab, variables-tab";
pub const FILTER_CARD_SELECTOR: &str =
    "tags-tab .gtm-debug-card, tags-tab__blocked-tags .gtm-debug-card";
pub const VARIABLE_ROW_SELECTOR: &str = "variables-tab .gtm-debug-variable-table-row, \
     variables-tab .gtm-debug-table-row, variables-tab .gtm-debug-card";
pub const TITLE_SELECTOR: &str = ".gtm-debug-card__title";
/// Type column of the variables table.
pub const VARIABLE_TYPE_CELL: &str = ".gtm-debug-variable-table-cell-20";
const TABLE_CELL: &str = ".gtm-debug-table-cell";
const STYLE_ID: &str = "gtm-lens-filter-styles";
pub const UNKNOWN_TYPE: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    #[serde(default)]
    pub query: String,
    /// Tag types to keep; empty keeps every type.
    #[serde(default)]
    pub types: Vec<String>,
    /// Variable types to keep; empty keeps every type.
    #[serde(default)]
    pub variable_types: Vec<String>,
    #[serde(default, skip_deserializing)]
    pub generation: u64,
}

/// Text read from one variable row or card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableFields {
    pub kind: Option<String>,
    /// Name, return type and value candidates, in lookup order.
    pub searchable: Vec<String>,
    /// Text of the type column of the table view.
    pub type_column: Option<String>,
    /// Whole text of the row.
    pub text: String,
}

impl VariableFields {
    pub fn kind_or_unknown(&self) -> &str {
        self.kind.as_deref().unwrap_or(UNKNOWN_TYPE)
    }
}

impl FilterState {
    /// Visibility of one card given its title and subtitle text.
    pub fn card_visible(&self, title: Option<&str>, subtitle: Option<&str>) -> bool {
        if let Some(subtitle) = subtitle {
            if subtitle.trim().eq_ignore_ascii_case("paused") {
                return false;
            }
        }
        if !self.types.is_empty() {
            if let Some(subtitle) = subtitle {
                if !self.types.iter().any(|kind| kind == tag_type(subtitle)) {
                    return false;
                }
            }
        }
        let query = self.query.trim();
        if !query.is_empty() {
            return match title {
                Some(title) => title.to_lowercase().contains(&query.to_lowercase()),
                None => false,
            };
        }
        true
    }

    /// The query matches name, return type or value. The type column alone never satisfies it.
    pub fn variable_visible(&self, fields: &VariableFields) -> bool {
        if !self.variable_types.is_empty()
            && !self
                .variable_types
                .iter()
                .any(|kind| kind == fields.kind_or_unknown())
        {
            return false;
        }
        let query = self.query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        if fields
            .searchable
            .iter()
            .any(|text| text.to_lowercase().contains(&query))
        {
            return true;
        }
        let text = fields.text.to_lowercase();
        match fields.type_column.as_deref().map(str::to_lowercase) {
            Some(kind) if !kind.is_empty() && kind.contains(&query) => {
                text.replacen(&kind, "", 1).contains(&query)
            }
            _ => text.contains(&query),
        }
    }

    pub fn summary(&self, variables: bool) -> String {
        let types = if variables {
            &self.variable_types
        } else {
            &self.types
        };
        if types.is_empty() {
            "All types".to_string()
        } else {
            format!("Types: {}", types.join(", "))
        }
    }
}

/// Tag type part of a card subtitle: the text before the first ` - `.
pub fn tag_type(subtitle: &str) -> &str {
    let subtitle = subtitle.trim();
    match subtitle.find(" - ") {
        Some(idx) => subtitle[..idx].trim(),
        None => subtitle,
    }
}

pub fn hidden_class() -> String {
    class_name("hidden")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeCount {
    pub name: String,
    pub count: usize,
}

/// Counts by descending frequency; equal counts keep first-seen order.
pub fn count_types<I: IntoIterator<Item = String>>(kinds: I) -> Vec<TypeCount> {
    let mut counts: Vec<TypeCount> = Vec::new();
    for kind in kinds {
        match counts.iter_mut().find(|entry| entry.name == kind) {
            Some(entry) => entry.count += 1,
            None => counts.push(TypeCount {
                name: kind,
                count: 1,
            }),
        }
    }
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

#[derive(Debug, Clone, Serialize)]
struct FilterReport<'a> {
    #[serde(flatten)]
    state: &'a FilterState,
    available: AvailableTypes,
}

#[derive(Debug, Clone, Serialize)]
struct AvailableTypes {
    tags: Vec<TypeCount>,
    variables: Vec<TypeCount>,
}

type SharedFilter = Arc<RwLock<FilterState>>;

struct FilterBar {
    filter: SharedFilter,
}

impl FilterBar {
    fn render(&self, dom: &dyn Dom, variables: bool) -> Result<NodeId, DomError> {
        let filter = self.filter.read().clone();
        let bar_class = class_name("filter-bar");
        let bar = element(dom, "div", &[("class", bar_class.as_str())])?;
        let search_class = class_name("filter-search");
        let placeholder = if variables {
            "Search by variable name or value..."
        } else {
            "Search by tag name..."
        };
        let search = element(
            dom,
            "input",
            &[
                ("class", search_class.as_str()),
                ("type", "search"),
                ("placeholder", placeholder),
                ("value", filter.query.as_str()),
            ],
        )?;
        let types_class = class_name("filter-types");
        let types = text_element(
            dom,
            "span",
            &[("class", types_class.as_str())],
            &filter.summary(variables),
        )?;
        append_all(dom, bar, &[search, types])?;
        Ok(bar)
    }
}

impl Enhancer for FilterBar {
    fn enhance(
        &self,
        dom: &dyn Dom,
        node: NodeId,
        journal: &mut DomJournal,
    ) -> Result<Outcome, EnhanceError> {
        let variables = dom.tag_name(node).as_deref() == Some("variables-tab");
        let bar = self.render(dom, variables)?;
        let first = dom.children(node).first().copied();
        journal.insert_before(dom, node, bar, first)?;
        Ok(Outcome::Enhanced)
    }

    fn fingerprint(&self, _dom: &dyn Dom, _node: NodeId) -> Option<String> {
        Some(self.filter.read().generation.to_string())
    }
}

fn hide(dom: &dyn Dom, node: NodeId, journal: &mut DomJournal) -> Result<Outcome, EnhanceError> {
    journal.add_class(dom, node, &hidden_class())?;
    journal.add_style(dom, node, "display: none")?;
    Ok(Outcome::Enhanced)
}

struct TagCards {
    title: Selector,
    subtitle: Selector,
}

impl TagCards {
    fn new() -> Result<Self, DomError> {
        Ok(Self {
            title: Selector::parse(TITLE_SELECTOR)?,
            subtitle: Selector::parse(SUBTITLE_SELECTOR)?,
        })
    }

    fn key(&self, dom: &dyn Dom, node: NodeId) -> (Option<String>, Option<String>) {
        (
            child_text(dom, node, &self.title),
            child_text(dom, node, &self.subtitle),
        )
    }

    fn kind(&self, dom: &dyn Dom, node: NodeId) -> Option<String> {
        let subtitle = child_text(dom, node, &self.subtitle)?;
        let kind = tag_type(&subtitle);
        (!kind.eq_ignore_ascii_case("paused")).then(|| kind.to_string())
    }
}

struct CardFilter {
    filter: SharedFilter,
    cards: TagCards,
}

impl Enhancer for CardFilter {
    fn enhance(
        &self,
        dom: &dyn Dom,
        node: NodeId,
        journal: &mut DomJournal,
    ) -> Result<Outcome, EnhanceError> {
        let (title, subtitle) = self.cards.key(dom, node);
        let visible = self
            .filter
            .read()
            .card_visible(title.as_deref(), subtitle.as_deref());
        if visible {
            return Ok(Outcome::Skipped);
        }
        hide(dom, node, journal)
    }

    fn fingerprint(&self, dom: &dyn Dom, node: NodeId) -> Option<String> {
        let (title, subtitle) = self.cards.key(dom, node);
        Some(format!(
            "{}|{}|{}",
            self.filter.read().generation,
            title.unwrap_or_default(),
            subtitle.unwrap_or_default()
        ))
    }
}

/// Card view and table view lookups for variables.
struct VariableRows {
    kind: Vec<Selector>,
    name: Vec<Selector>,
    value: Vec<Selector>,
    type_cell: Selector,
    cell: Selector,
}

impl VariableRows {
    fn new() -> Result<Self, DomError> {
        let parse_all = |selectors: &[&str]| -> Result<Vec<Selector>, DomError> {
            selectors.iter().map(|raw| Selector::parse(raw)).collect()
        };
        Ok(Self {
            kind: parse_all(&[SUBTITLE_SELECTOR, VARIABLE_TYPE_CELL])?,
            name: parse_all(&[TITLE_SELECTOR, ".gtm-debug-chip"])?,
            value: parse_all(&[
                ".gtm-debug-card__value",
                ".gtm-debug-variables-value",
                ".gtm-debug-variable-table-value",
            ])?,
            type_cell: Selector::parse(VARIABLE_TYPE_CELL)?,
            cell: Selector::parse(TABLE_CELL)?,
        })
    }

    /// Table cell that is the `position`-th (1-based) element child of its row.
    fn nth_cell(&self, dom: &dyn Dom, node: NodeId, position: usize) -> Option<NodeId> {
        dom.query_within(node, &self.cell).into_iter().find(|cell| {
            dom.parent(*cell)
                .and_then(|parent| dom.element_children(parent).iter().position(|c| c == cell))
                == Some(position - 1)
        })
    }

    fn last_cell(&self, dom: &dyn Dom, node: NodeId) -> Option<NodeId> {
        dom.query_within(node, &self.cell).into_iter().find(|cell| {
            dom.parent(*cell)
                .and_then(|parent| dom.element_children(parent).last().copied())
                == Some(*cell)
        })
    }

    fn text(dom: &dyn Dom, node: Option<NodeId>) -> Option<String> {
        node.map(|found| dom.text_content(found).trim().to_string())
    }

    fn fields(&self, dom: &dyn Dom, node: NodeId) -> VariableFields {
        let kind = self
            .kind
            .iter()
            .filter_map(|selector| Self::text(dom, dom.query_first(node, selector)))
            .chain(Self::text(dom, self.nth_cell(dom, node, 2)))
            .find(|text| !text.is_empty());

        let mut searchable: Vec<String> = self
            .name
            .iter()
            .filter_map(|selector| Self::text(dom, dom.query_first(node, selector)))
            .collect();
        searchable.extend(Self::text(dom, self.nth_cell(dom, node, 1)));
        searchable.extend(Self::text(dom, self.nth_cell(dom, node, 3)));
        searchable.extend(
            self.value
                .iter()
                .filter_map(|selector| Self::text(dom, dom.query_first(node, selector))),
        );
        searchable.extend(Self::text(dom, self.nth_cell(dom, node, 4)));
        searchable.extend(Self::text(dom, self.last_cell(dom, node)));

        VariableFields {
            kind,
            searchable,
            type_column: Self::text(dom, dom.query_first(node, &self.type_cell)),
            text: dom.text_content(node),
        }
    }
}

struct VariableFilter {
    filter: SharedFilter,
    rows: VariableRows,
}

impl Enhancer for VariableFilter {
    fn enhance(
        &self,
        dom: &dyn Dom,
        node: NodeId,
        journal: &mut DomJournal,
    ) -> Result<Outcome, EnhanceError> {
        let fields = self.rows.fields(dom, node);
        if self.filter.read().variable_visible(&fields) {
            return Ok(Outcome::Skipped);
        }
        hide(dom, node, journal)
    }

    fn fingerprint(&self, dom: &dyn Dom, node: NodeId) -> Option<String> {
        Some(format!(
            "{}|{}",
            self.filter.read().generation,
            dom.text_content(node)
        ))
    }
}

struct FilterCommands {
    filter: SharedFilter,
    dom: Arc<dyn Dom>,
    cards: TagCards,
    rows: VariableRows,
    card_selector: Selector,
    row_selector: Selector,
}

impl FilterCommands {
    fn replace(&self, next: FilterState) -> Result<CommandOutcome, FeatureError> {
        let mut filter = self.filter.write();
        let generation = filter.generation + 1;
        *filter = FilterState { generation, ..next };
        let response = serde_json::to_value(&*filter)
            .map_err(|err| FeatureError::InvalidPayload(err.to_string()))?;
        Ok(CommandOutcome {
            response,
            rescan: true,
        })
    }

    fn available(&self) -> AvailableTypes {
        let dom = self.dom.as_ref();
        let tags = count_types(
            dom.query_all(&self.card_selector)
                .into_iter()
                .filter_map(|card| self.cards.kind(dom, card)),
        );
        let variables = count_types(
            dom.query_all(&self.row_selector)
                .into_iter()
                .map(|row| self.rows.fields(dom, row).kind_or_unknown().to_string()),
        );
        AvailableTypes { tags, variables }
    }

    fn report(&self) -> Result<CommandOutcome, FeatureError> {
        let available = self.available();
        let filter = self.filter.read();
        let response = serde_json::to_value(FilterReport {
            state: &filter,
            available,
        })
        .map_err(|err| FeatureError::InvalidPayload(err.to_string()))?;
        Ok(CommandOutcome {
            response,
            rescan: false,
        })
    }
}

impl CommandHandler for FilterCommands {
    fn handle(&self, command: &str, payload: &Value) -> Option<Result<CommandOutcome, FeatureError>> {
        let outcome = match command {
            "set-filter" => {
                let next = if payload.is_null() {
                    Ok(FilterState::default())
                } else {
                    serde_json::from_value::<FilterState>(payload.clone())
                        .map_err(|err| FeatureError::InvalidPayload(err.to_string()))
                };
                next.and_then(|next| self.replace(next))
            }
            "clear-filter" => self.replace(FilterState::default()),
            "get-filter" => self.report(),
            _ => return None,
        };
        Some(outcome)
    }
}

fn stylesheet() -> StyleSheet {
    StyleSheet::new(
        STYLE_ID,
        format!(
            ".{hidden} {{ display: none !important; }}\n\
             .{bar} {{ display: flex; gap: 8px; align-items: center; padding: 8px 0; }}\n\
             .{search} {{ flex: 1; padding: 4px 8px; }}\n\
             .{types} {{ color: #6c757d; font-size: 12px; }}",
            hidden = hidden_class(),
            bar = class_name("filter-bar"),
            search = class_name("filter-search"),
            types = class_name("filter-types"),
        ),
    )
}

pub fn build(dom: Arc<dyn Dom>, debounce: Duration) -> Result<ReconciledFeature, FeatureError> {
    let filter: SharedFilter = Arc::new(RwLock::new(FilterState::default()));
    let bar_spec = ReconcilerSpec::new(format!("{PREVIEW_UI_FILTERING}-bar"), TAB_SELECTOR)?
        .with_debounce(debounce);
    let card_spec = ReconcilerSpec::new(PREVIEW_UI_FILTERING, FILTER_CARD_SELECTOR)?
        .with_observe(ObserveOptions::default().with_character_data())
        .with_debounce(debounce);
    let variable_spec = ReconcilerSpec::new(
        format!("{PREVIEW_UI_FILTERING}-variables"),
        VARIABLE_ROW_SELECTOR,
    )?
    .with_observe(ObserveOptions::default().with_character_data())
    .with_debounce(debounce);

    let commands = FilterCommands {
        filter: Arc::clone(&filter),
        dom: Arc::clone(&dom),
        cards: TagCards::new()?,
        rows: VariableRows::new()?,
        card_selector: Selector::parse(FILTER_CARD_SELECTOR)?,
        row_selector: Selector::parse(VARIABLE_ROW_SELECTOR)?,
    };
    Ok(ReconciledFeature::new(PREVIEW_UI_FILTERING, dom)
        .with_style(stylesheet())
        .with_part(
            bar_spec,
            Arc::new(FilterBar {
                filter: Arc::clone(&filter),
            }),
        )
        .with_part(
            card_spec,
            Arc::new(CardFilter {
                filter: Arc::clone(&filter),
                cards: TagCards::new()?,
            }),
        )
        .with_part(
            variable_spec,
            Arc::new(VariableFilter {
                filter: Arc::clone(&filter),
                rows: VariableRows::new()?,
            }),
        )
        .with_commands(Arc::new(commands)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(query: &str, types: &[&str]) -> FilterState {
        FilterState {
            query: query.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
            ..FilterState::default()
        }
    }

    fn variable(kind: Option<&str>, searchable: &[&str], text: &str) -> VariableFields {
        VariableFields {
            kind: kind.map(str::to_string),
            searchable: searchable.iter().map(|s| s.to_string()).collect(),
            type_column: kind.map(str::to_string),
            text: text.to_string(),
        }
    }

    #[test]
    fn paused_cards_are_always_hidden() {
        let open = FilterState::default();
        assert!(!open.card_visible(Some("GA4"), Some("Paused")));
        assert!(open.card_visible(Some("GA4"), Some("Google Analytics: GA4 Event")));
        assert!(open.card_visible(None, None));
    }

    #[test]
    fn type_filter_compares_text_before_dash() {
        let by_type = filter("", &["Google Analytics: GA4 Event"]);
        assert!(by_type.card_visible(Some("a"), Some("Google Analytics: GA4 Event - Fired once")));
        assert!(!by_type.card_visible(Some("a"), Some("Custom HTML")));
        assert!(by_type.card_visible(Some("a"), None));
        assert_eq!(tag_type(" Custom HTML - Fired "), "Custom HTML");
    }

    #[test]
    fn query_matches_title_case_insensitively() {
        let search = filter("purchase", &[]);
        assert!(search.card_visible(Some("GA4 - Purchase"), Some("Custom")));
        assert!(!search.card_visible(Some("GA4 - page_view"), Some("Custom")));
        assert!(!search.card_visible(None, Some("Custom")));
    }

    #[test]
    fn variable_query_skips_type_column() {
        let row = variable(
            Some("Data Layer Variable"),
            &["ecommerce.value", "number", "12.5"],
            "ecommerce.valueData Layer Variablenumber12.5",
        );
        assert!(filter("ECOMMERCE", &[]).variable_visible(&row));
        assert!(filter("number", &[]).variable_visible(&row));
        assert!(!filter("layer", &[]).variable_visible(&row));

        let unnamed = variable(None, &[], "Event Nameclick");
        assert!(filter("click", &[]).variable_visible(&unnamed));
    }

    #[test]
    fn variable_type_filter_uses_unknown_for_untyped_rows() {
        let only_unknown = FilterState {
            variable_types: vec![UNKNOWN_TYPE.to_string()],
            ..FilterState::default()
        };
        assert!(only_unknown.variable_visible(&variable(None, &[], "x")));
        assert!(!only_unknown.variable_visible(&variable(Some("Constant"), &[], "x")));
        assert!(FilterState::default().variable_visible(&variable(Some("Constant"), &[], "x")));
    }

    #[test]
    fn type_counts_sort_by_frequency_then_first_seen() {
        let counts = count_types(
            ["Custom HTML", "GA4", "GA4", "Pixel", "Custom HTML", "GA4"]
                .iter()
                .map(|s| s.to_string()),
        );
        let flat: Vec<(&str, usize)> = counts.iter().map(|c| (c.name.as_str(), c.count)).collect();
        assert_eq!(flat, vec![("GA4", 3), ("Custom HTML", 2), ("Pixel", 1)]);
    }

    #[test]
    fn set_filter_bumps_generation() {
        let shared: SharedFilter = Arc::new(RwLock::new(FilterState::default()));
        let dom: Arc<dyn Dom> = Arc::new(
            gtm_lens_dom_reconciler::MemoryDom::parse("<html><body></body></html>").unwrap(),
        );
        let commands = FilterCommands {
            filter: Arc::clone(&shared),
            dom,
            cards: TagCards::new().unwrap(),
            rows: VariableRows::new().unwrap(),
            card_selector: Selector::parse(FILTER_CARD_SELECTOR).unwrap(),
            row_selector: Selector::parse(VARIABLE_ROW_SELECTOR).unwrap(),
        };
        let outcome = commands
            .handle("set-filter", &serde_json::json!({"query": "ga4", "generation": 99}))
            .unwrap()
            .unwrap();
        assert!(outcome.rescan);
        assert_eq!(outcome.response["query"], "ga4");
        assert_eq!(shared.read().generation, 1);

        let got = commands.handle("get-filter", &Value::Null).unwrap().unwrap();
        assert!(!got.rescan);
        assert_eq!(got.response["available"]["tags"], serde_json::json!([]));
        assert!(commands.handle("set-filter", &serde_json::json!({"types": 3})).unwrap().is_err());
        assert!(commands.handle("unknown", &Value::Null).is_none());
    }
}
