//! Owned attribute tree for one legacy group

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl AttrValue {
    /// Integer view; floats are accepted when they hold a whole number
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            AttrValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Floating point view of a numeric attribute
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(*v),
            AttrValue::Str(_) => None,
        }
    }

    /// String view of a string attribute
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Render any attribute as text
    pub fn to_text(&self) -> String {
        match self {
            AttrValue::Int(v) => v.to_string(),
            AttrValue::Float(v) => v.to_string(),
            AttrValue::Str(s) => s.clone(),
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

/// A group: attributes, named child groups and an optional signal dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(default)]
    pub attrs: BTreeMap<String, AttrValue>,

    #[serde(default)]
    pub groups: BTreeMap<String, Group>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<Vec<i16>>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add an attribute
    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    /// Builder: add a child group
    pub fn with_group(mut self, name: &str, group: Group) -> Self {
        self.groups.insert(name.to_string(), group);
        self
    }

    /// Builder: attach a signal dataset
    pub fn with_signal(mut self, samples: Vec<i16>) -> Self {
        self.signal = Some(samples);
        self
    }

    /// Look up an attribute
    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    /// Look up a child group
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// Attributes rendered as text, for free-form metadata maps
    pub fn attrs_as_text(&self) -> BTreeMap<String, String> {
        self.attrs
            .iter()
            .map(|(k, v)| (k.clone(), v.to_text()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_views() {
        assert_eq!(AttrValue::Int(7).as_f64(), Some(7.0));
        assert_eq!(AttrValue::Float(8192.0).as_i64(), Some(8192));
        assert_eq!(AttrValue::Float(1.5).as_i64(), None);
        assert_eq!(AttrValue::from("x").as_i64(), None);
        assert_eq!(AttrValue::from("minion").as_str(), Some("minion"));
        assert_eq!(AttrValue::Int(3).to_text(), "3");
    }

    #[test]
    fn test_untagged_json() {
        let group: Group = serde_json::from_str(
            r#"{"attrs": {"a": 1, "b": 2.5, "c": "text"}, "groups": {"Raw": {"signal": [1, -2]}}}"#,
        )
        .unwrap();

        assert_eq!(group.attr("a"), Some(&AttrValue::Int(1)));
        assert_eq!(group.attr("b"), Some(&AttrValue::Float(2.5)));
        assert_eq!(group.attr("c"), Some(&AttrValue::Str("text".into())));
        assert_eq!(group.group("Raw").unwrap().signal, Some(vec![1, -2]));
    }
}
