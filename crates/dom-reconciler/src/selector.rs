//! CSS selector subset used by the augmentations.
//!
//! Groups separated by `,`; each group is a chain of compound selectors (`tag`, `#id`,
//! `.class`, `[attr]`, `[attr=value]`, `[attr="value"]`) joined by descendant (whitespace),
//! child (`>`) or adjacent-sibling (`+`) combinators.

use std::fmt;
use std::str::FromStr;

use crate::dom::{Dom, NodeId};
use crate::errors::DomError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrCondition {
    name: String,
    value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
    AdjacentSibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Part {
    compound: Compound,
    // Relation to the part on the left.
    combinator: Option<Combinator>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    groups: Vec<Vec<Part>>,
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&self.source).finish()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Selector {
    type Err = DomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self, DomError> {
        let groups = split_groups(source)?
            .iter()
            .map(|group| parse_chain(group))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            source: source.trim().to_string(),
            groups,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches<D: Dom + ?Sized>(&self, dom: &D, node: NodeId) -> bool {
        self.groups
            .iter()
            .any(|parts| !parts.is_empty() && match_from(dom, node, parts, parts.len() - 1))
    }
}

/// Right-to-left match with backtracking over descendant ancestors.
fn match_from<D: Dom + ?Sized>(dom: &D, node: NodeId, parts: &[Part], idx: usize) -> bool {
    if !matches_compound(dom, node, &parts[idx].compound) {
        return false;
    }
    if idx == 0 {
        return true;
    }
    match parts[idx].combinator.unwrap_or(Combinator::Descendant) {
        Combinator::Child => dom
            .parent(node)
            .map(|parent| match_from(dom, parent, parts, idx - 1))
            .unwrap_or(false),
        Combinator::AdjacentSibling => dom
            .previous_element_sibling(node)
            .map(|sibling| match_from(dom, sibling, parts, idx - 1))
            .unwrap_or(false),
        Combinator::Descendant => {
            let mut cursor = dom.parent(node);
            while let Some(ancestor) = cursor {
                if match_from(dom, ancestor, parts, idx - 1) {
                    return true;
                }
                cursor = dom.parent(ancestor);
            }
            false
        }
    }
}

fn matches_compound<D: Dom + ?Sized>(dom: &D, node: NodeId, compound: &Compound) -> bool {
    let Some(tag) = dom.tag_name(node) else {
        return false;
    };
    if let Some(expected) = &compound.tag {
        if !tag.eq_ignore_ascii_case(expected) {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if dom.attribute(node, "id").as_deref() != Some(id.as_str()) {
            return false;
        }
    }
    if !compound.classes.is_empty() {
        let classes = dom.classes(node);
        if !compound
            .classes
            .iter()
            .all(|class| classes.iter().any(|c| c == class))
        {
            return false;
        }
    }
    compound.attrs.iter().all(|cond| {
        match (dom.attribute(node, &cond.name), &cond.value) {
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual == *expected,
            (None, _) => false,
        }
    })
}

fn invalid(source: &str) -> DomError {
    DomError::InvalidSelector(source.trim().to_string())
}

fn split_groups(source: &str) -> Result<Vec<String>, DomError> {
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut bracket_depth = 0usize;

    for ch in source.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(ch);
            }
            (Some(_), _) => current.push(ch),
            (None, '"' | '\'') if bracket_depth > 0 => {
                quote = Some(ch);
                current.push(ch);
            }
            (None, '[') => {
                bracket_depth += 1;
                current.push(ch);
            }
            (None, ']') => {
                if bracket_depth == 0 {
                    return Err(invalid(source));
                }
                bracket_depth -= 1;
                current.push(ch);
            }
            (None, ',') if bracket_depth == 0 => {
                let trimmed = current.trim();
                if trimmed.is_empty() {
                    return Err(invalid(source));
                }
                groups.push(trimmed.to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if quote.is_some() || bracket_depth != 0 {
        return Err(invalid(source));
    }
    let trimmed = current.trim();
    if trimmed.is_empty() {
        return Err(invalid(source));
    }
    groups.push(trimmed.to_string());
    Ok(groups)
}

fn tokenize(source: &str) -> Result<Vec<String>, DomError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut bracket_depth = 0usize;

    let flush = |current: &mut String, tokens: &mut Vec<String>| {
        if !current.is_empty() {
            tokens.push(std::mem::take(current));
        }
    };

    for ch in source.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(ch);
            }
            (Some(_), _) => current.push(ch),
            (None, '"' | '\'') if bracket_depth > 0 => {
                quote = Some(ch);
                current.push(ch);
            }
            (None, '[') => {
                bracket_depth += 1;
                current.push(ch);
            }
            (None, ']') => {
                bracket_depth = bracket_depth.checked_sub(1).ok_or_else(|| invalid(source))?;
                current.push(ch);
            }
            (None, '>' | '+') if bracket_depth == 0 => {
                flush(&mut current, &mut tokens);
                tokens.push(ch.to_string());
            }
            (None, c) if c.is_whitespace() && bracket_depth == 0 => {
                flush(&mut current, &mut tokens);
            }
            _ => current.push(ch),
        }
    }
    if quote.is_some() || bracket_depth != 0 {
        return Err(invalid(source));
    }
    flush(&mut current, &mut tokens);
    Ok(tokens)
}

fn parse_chain(source: &str) -> Result<Vec<Part>, DomError> {
    let mut parts = Vec::new();
    let mut pending: Option<Combinator> = None;

    for token in tokenize(source)? {
        if token == ">" || token == "+" {
            if pending.is_some() || parts.is_empty() {
                return Err(invalid(source));
            }
            pending = Some(if token == ">" {
                Combinator::Child
            } else {
                Combinator::AdjacentSibling
            });
            continue;
        }
        let compound = parse_compound(&token).ok_or_else(|| invalid(source))?;
        let combinator = if parts.is_empty() {
            None
        } else {
            Some(pending.take().unwrap_or(Combinator::Descendant))
        };
        parts.push(Part {
            compound,
            combinator,
        });
    }
    if parts.is_empty() || pending.is_some() {
        return Err(invalid(source));
    }
    Ok(parts)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &[char], mut i: usize) -> Option<(String, usize)> {
    let start = i;
    while i < chars.len() && is_ident_char(chars[i]) {
        i += 1;
    }
    (i > start).then(|| (chars[start..i].iter().collect(), i))
}

fn parse_compound(token: &str) -> Option<Compound> {
    let chars: Vec<char> = token.chars().collect();
    let mut compound = Compound::default();
    let mut i = 0usize;

    while i < chars.len() {
        match chars[i] {
            '#' => {
                let (id, next) = take_ident(&chars, i + 1)?;
                if compound.id.replace(id).is_some() {
                    return None;
                }
                i = next;
            }
            '.' => {
                let (class, next) = take_ident(&chars, i + 1)?;
                compound.classes.push(class);
                i = next;
            }
            '[' => {
                let (cond, next) = parse_attr(&chars, i + 1)?;
                compound.attrs.push(cond);
                i = next;
            }
            _ => {
                if i != 0 {
                    return None;
                }
                let (tag, next) = take_ident(&chars, i)?;
                compound.tag = Some(tag.to_ascii_lowercase());
                i = next;
            }
        }
    }
    Some(compound)
}

/// Parses from just after `[` through the closing `]`.
fn parse_attr(chars: &[char], start: usize) -> Option<(AttrCondition, usize)> {
    let (name, mut i) = take_ident(chars, start)?;
    match *chars.get(i)? {
        ']' => Some((AttrCondition { name, value: None }, i + 1)),
        '=' => {
            i += 1;
            let value = match *chars.get(i)? {
                q @ ('"' | '\'') => {
                    let close = chars[i + 1..].iter().position(|c| *c == q)? + i + 1;
                    let value: String = chars[i + 1..close].iter().collect();
                    i = close + 1;
                    value
                }
                _ => {
                    let close = chars[i..].iter().position(|c| *c == ']')? + i;
                    let value: String = chars[i..close].iter().collect();
                    if value.is_empty() || value.contains(char::is_whitespace) {
                        return None;
                    }
                    i = close;
                    value
                }
            };
            if chars.get(i) != Some(&']') {
                return None;
            }
            Some((
                AttrCondition {
                    name,
                    value: Some(value),
                },
                i + 1,
            ))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_real_target_selectors() {
        for source in [
            "tags-tab .gtm-debug-card",
            "pre[data-ng-if=\"ctrl.message.body\"], div.gtm-debug-console-row__message > div",
            ".message-list__group .message-list__row--child-selected .wd-debug-message-title",
            ".gtm-debug-table-cell--query-param + .gtm-debug-table-cell pre",
            "http-url-details",
            "[data-x=a]",
            "#id.cls[flag]",
        ] {
            assert!(Selector::parse(source).is_ok(), "{source}");
        }
    }

    #[test]
    fn rejects_malformed_selectors() {
        for source in ["", " , a", "a >", "> a", "a > > b", "[x", "a[x=\"y]", "a.", "a#", "a:hover", "a b[c d]"] {
            assert!(
                matches!(Selector::parse(source), Err(DomError::InvalidSelector(_))),
                "{source:?}"
            );
        }
    }

    #[test]
    fn quoted_values_may_contain_separators() {
        let selector = Selector::parse("a[title=\"x, y > z\"]").unwrap();
        assert_eq!(selector.groups.len(), 1);
        assert_eq!(
            selector.groups[0][0].compound.attrs[0].value.as_deref(),
            Some("x, y > z")
        );
    }
}
