//! Wizard form parsing.
//!
//! Walks a single `<form>` and reduces it to what the next request needs:
//! where to post, what to pass through untouched, and which human-readable
//! labels map to which option values. The GeoConvert pages lay their radio
//! buttons out in unlabelled tables, so radio labels are reconstructed from
//! the surrounding cells.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::dom::{input_type, Node, Snapshot};
use crate::error::GeoconvertResult;

/// Name/value of the form's submit control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitControl {
    pub name: String,
    /// Absent when the control has no `value`; such a control is not sent.
    pub value: Option<String>,
}

/// Where a choice group came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Radio,
    Select,
}

/// One selectable option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub label: String,
    pub value: String,
}

/// A radio group or select element: ordered label → value pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceGroup {
    pub name: String,
    pub kind: GroupKind,
    pub choices: Vec<Choice>,
}

impl ChoiceGroup {
    fn new(name: &str, kind: GroupKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            choices: Vec::new(),
        }
    }

    /// A repeated label keeps its original position and takes the newer value.
    fn insert(&mut self, label: String, value: String) {
        match self.choices.iter_mut().find(|c| c.label == label) {
            Some(existing) => existing.value = value,
            None => self.choices.push(Choice { label, value }),
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.choices.iter().map(|c| c.label.as_str())
    }

    /// First choice, in insertion order, whose label contains `wanted`
    /// ignoring case.
    pub fn resolve(&self, wanted: &str) -> Option<&Choice> {
        let needle = wanted.to_lowercase();
        self.choices
            .iter()
            .find(|c| c.label.to_lowercase().contains(&needle))
    }
}

/// Normalized view of one wizard form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedForm {
    /// Endpoint for the next request, as written in the page.
    pub action: String,
    pub submit: Option<SubmitControl>,
    /// Hidden inputs carrying server-side wizard state.
    pub hidden: BTreeMap<String, String>,
    pub groups: Vec<ChoiceGroup>,
}

impl ParsedForm {
    /// Parse the first form of a snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> GeoconvertResult<Self> {
        parse_form(&snapshot.first_form()?)
    }

    pub fn group(&self, name: &str) -> Option<&ChoiceGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    fn upsert_group(&mut self, group: ChoiceGroup) {
        match self.groups.iter_mut().find(|g| g.name == group.name) {
            Some(existing) => *existing = group,
            None => self.groups.push(group),
        }
    }
}

/// Parse a `<form>` element.
///
/// Missing attributes are errors: a form without `action`, a hidden input
/// without `value` or a radio without `name` means the page changed shape.
pub fn parse_form(form: &Node<'_>) -> GeoconvertResult<ParsedForm> {
    let action = form.require("form", "action")?.to_string();

    let submit = form
        .find("input", input_type("submit"))
        .and_then(|s| {
            s.attr("name").map(|name| SubmitControl {
                name: name.to_string(),
                value: s.attr("value").map(String::from),
            })
        });

    let mut parsed = ParsedForm {
        action,
        submit,
        hidden: BTreeMap::new(),
        groups: Vec::new(),
    };

    for group in parse_radio_groups(form)? {
        parsed.upsert_group(group);
    }

    for select in form.children("select", |_| true) {
        parsed.upsert_group(parse_select(&select)?);
    }

    for hidden in form.children("input", input_type("hidden")) {
        let name = hidden.require("input type=hidden", "name")?;
        let value = hidden.require("input type=hidden", "value")?;
        parsed.hidden.insert(name.to_string(), value.to_string());
    }

    tracing::debug!(
        action = %parsed.action,
        hidden = parsed.hidden.len(),
        groups = parsed.groups.len(),
        "parsed form"
    );

    Ok(parsed)
}

/// Radio inputs grouped by `name`, groups in order of first appearance.
fn parse_radio_groups(form: &Node<'_>) -> GeoconvertResult<Vec<ChoiceGroup>> {
    let mut groups: Vec<ChoiceGroup> = Vec::new();

    for radio in form.children("input", input_type("radio")) {
        let name = radio.require("input type=radio", "name")?;
        let value = radio.require("input type=radio", "value")?;
        let label = radio_label(&radio, value);

        let idx = match groups.iter().position(|g| g.name == name) {
            Some(idx) => idx,
            None => {
                groups.push(ChoiceGroup::new(name, GroupKind::Radio));
                groups.len() - 1
            }
        };
        groups[idx].insert(label, value.to_string());
    }

    Ok(groups)
}

fn parse_select(select: &Node<'_>) -> GeoconvertResult<ChoiceGroup> {
    let name = select.require("select", "name")?;
    let mut group = ChoiceGroup::new(name, GroupKind::Select);

    for option in select.children("option", |_| true) {
        let text = option.text().trim().to_string();
        // HTML submits the option text when there is no value attribute.
        let value = option.attr("value").map_or_else(|| text.clone(), String::from);
        group.insert(text, value);
    }

    Ok(group)
}

/// Human-readable label for a radio button: its `id`, else the text around
/// it, else its raw value.
fn radio_label(radio: &Node<'_>, value: &str) -> String {
    if let Some(id) = radio.attr("id") {
        return id.to_string();
    }
    match context_text(radio) {
        Some(text) if !text.trim().is_empty() => text,
        _ => value.to_string(),
    }
}

/// Text of the radio's parent; when the parent has no text at all and the
/// radio sits in a table cell, a label rebuilt from the cells of its row.
/// Whitespace-only parent text yields an empty label, which falls back to
/// the value.
fn context_text(radio: &Node<'_>) -> Option<String> {
    let parent = radio.parent()?;
    let text = parent.text();
    if !text.is_empty() {
        return Some(text.trim().to_string());
    }
    if parent.name() != "td" {
        return None;
    }

    let row = radio.ancestor("tr")?;
    let cells: Vec<String> = row
        .children("td", |_| true)
        .iter()
        .map(|td| td.text().trim().to_string())
        .collect();
    Some(row_label(&cells))
}

/// Compose a label from the cells of a table row.
///
/// The column picks for four and five cells match the layouts observed on
/// the GeoConvert lookup-table pages; other widths have no known layout.
pub fn row_label(cells: &[String]) -> String {
    match cells {
        [only] => only.clone(),
        [a, b] | [a, b, _] => format!("{a} -> {b}"),
        [_, b, _, d] => format!("{b} -> {d}"),
        [_, b, _, _, e] => format!("{b} -> {e}"),
        _ => cells.join(", "),
    }
}
