//! POST payload construction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GeoconvertError, GeoconvertResult};
use crate::form::ParsedForm;

/// Requested choices for one step: group name → text the wanted label
/// contains (case-insensitive).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selections(BTreeMap<String, String>);

impl Selections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, group: impl Into<String>, wanted: impl Into<String>) -> Self {
        self.set(group, wanted);
        self
    }

    pub fn set(&mut self, group: impl Into<String>, wanted: impl Into<String>) {
        self.0.insert(group.into(), wanted.into());
    }

    pub fn get(&self, group: &str) -> Option<&str> {
        self.0.get(group).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Selections {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One field of a payload, tagged with where its value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PayloadEntry {
    /// Passed through from a hidden input.
    Hidden { name: String, value: String },
    /// The form's submit control.
    Submit { name: String, value: String },
    /// A resolved radio/select choice.
    Selection {
        name: String,
        label: String,
        value: String,
    },
}

impl PayloadEntry {
    pub fn name(&self) -> &str {
        match self {
            PayloadEntry::Hidden { name, .. }
            | PayloadEntry::Submit { name, .. }
            | PayloadEntry::Selection { name, .. } => name,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            PayloadEntry::Hidden { value, .. }
            | PayloadEntry::Submit { value, .. }
            | PayloadEntry::Selection { value, .. } => value,
        }
    }
}

/// Form fields for one wizard request. Field names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Payload {
    entries: Vec<PayloadEntry>,
}

impl Payload {
    /// Merge a parsed form with the requested selections.
    ///
    /// The submit control comes first, then hidden fields, then selections;
    /// a later entry with the same name replaces an earlier one. Groups
    /// that are not requested are left out so the server applies its own
    /// defaults.
    pub fn build(form: &ParsedForm, selections: &Selections) -> GeoconvertResult<Self> {
        let mut payload = Payload::default();

        if let Some(submit) = &form.submit {
            if let Some(value) = &submit.value {
                payload.push(PayloadEntry::Submit {
                    name: submit.name.clone(),
                    value: value.clone(),
                });
            }
        }

        for (name, value) in &form.hidden {
            payload.push(PayloadEntry::Hidden {
                name: name.clone(),
                value: value.clone(),
            });
        }

        for (group_name, wanted) in selections.iter() {
            let group = form
                .group(group_name)
                .ok_or_else(|| GeoconvertError::UnknownGroup(group_name.to_string()))?;
            let choice = group
                .resolve(wanted)
                .ok_or_else(|| GeoconvertError::NoMatchingChoice {
                    group: group_name.to_string(),
                    wanted: wanted.to_string(),
                    available: group.labels().map(String::from).collect(),
                })?;
            payload.push(PayloadEntry::Selection {
                name: group_name.to_string(),
                label: choice.label.clone(),
                value: choice.value.clone(),
            });
        }

        Ok(payload)
    }

    fn push(&mut self, entry: PayloadEntry) {
        match self.entries.iter_mut().find(|e| e.name() == entry.name()) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn entries(&self) -> &[PayloadEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name() == name)
            .map(PayloadEntry::value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Name/value pairs ready for `application/x-www-form-urlencoded` or
    /// multipart text parts.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|e| (e.name().to_string(), e.value().to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{Choice, ChoiceGroup, GroupKind, SubmitControl};

    fn geography_form() -> ParsedForm {
        ParsedForm {
            action: "step3.cfm".into(),
            submit: Some(SubmitControl {
                name: "next".into(),
                value: Some("Next".into()),
            }),
            hidden: [("jobid", "7"), ("step", "2")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            groups: vec![ChoiceGroup {
                name: "sourcetype".into(),
                kind: GroupKind::Radio,
                choices: vec![
                    Choice {
                        label: "Lower Layer Super Output Area".into(),
                        value: "LSOA".into(),
                    },
                    Choice {
                        label: "Output Area".into(),
                        value: "OA".into(),
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_case_insensitive_substring_selection() {
        let payload = Payload::build(
            &geography_form(),
            &Selections::new().with("sourcetype", "lower"),
        )
        .unwrap();
        assert_eq!(payload.get("sourcetype"), Some("LSOA"));
    }

    #[test]
    fn test_first_match_in_insertion_order_wins() {
        // "area" matches both labels; the first recorded one wins.
        let payload = Payload::build(
            &geography_form(),
            &Selections::new().with("sourcetype", "AREA"),
        )
        .unwrap();
        assert_eq!(payload.get("sourcetype"), Some("LSOA"));
    }

    #[test]
    fn test_hidden_and_submit_copied() {
        let payload = Payload::build(&geography_form(), &Selections::new()).unwrap();
        assert_eq!(payload.get("jobid"), Some("7"));
        assert_eq!(payload.get("step"), Some("2"));
        assert_eq!(payload.get("next"), Some("Next"));
        assert_eq!(payload.get("sourcetype"), None);
        assert_eq!(payload.len(), 3);
    }

    #[test]
    fn test_valueless_submit_is_not_sent() {
        let mut form = geography_form();
        form.submit = Some(SubmitControl {
            name: "next".into(),
            value: None,
        });
        let payload = Payload::build(&form, &Selections::new()).unwrap();
        assert_eq!(payload.get("next"), None);
    }

    #[test]
    fn test_build_is_idempotent() {
        let form = geography_form();
        let selections = Selections::new().with("sourcetype", "output");
        let first = Payload::build(&form, &selections).unwrap();
        let second = Payload::build(&form, &selections).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_fields(), second.to_fields());
    }

    #[test]
    fn test_no_match_reports_available_labels() {
        let err = Payload::build(
            &geography_form(),
            &Selections::new().with("sourcetype", "postcode"),
        )
        .unwrap_err();
        match err {
            GeoconvertError::NoMatchingChoice {
                group, available, ..
            } => {
                assert_eq!(group, "sourcetype");
                assert_eq!(available.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_group() {
        let err = Payload::build(
            &geography_form(),
            &Selections::new().with("targettype", "lower"),
        )
        .unwrap_err();
        assert!(matches!(err, GeoconvertError::UnknownGroup(g) if g == "targettype"));
    }

    #[test]
    fn test_hidden_replaces_submit_with_same_name() {
        let mut form = geography_form();
        form.submit = Some(SubmitControl {
            name: "next".into(),
            value: Some("S".into()),
        });
        form.hidden.insert("next".into(), "H".into());
        let payload = Payload::build(&form, &Selections::new()).unwrap();
        assert_eq!(payload.get("next"), Some("H"));
        assert!(matches!(
            payload.entries().iter().find(|e| e.name() == "next"),
            Some(PayloadEntry::Hidden { .. })
        ));
        assert_eq!(payload.len(), 3);
    }

    #[test]
    fn test_selection_replaces_hidden_with_same_name() {
        let mut form = geography_form();
        form.hidden.insert("sourcetype".into(), "stale".into());
        let payload =
            Payload::build(&form, &Selections::new().with("sourcetype", "output")).unwrap();
        assert_eq!(payload.get("sourcetype"), Some("OA"));
        assert_eq!(
            payload
                .entries()
                .iter()
                .filter(|e| e.name() == "sourcetype")
                .count(),
            1
        );
    }
}
