// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Attribute values carried by op args, cooked locations, and graph descriptions.
use std::collections::BTreeMap;

use blake3::Hasher;
use serde::{Deserialize, Serialize};

/// 256-bit BLAKE3 content digest.
pub type Hash = [u8; 32];

/// An immutable attribute value.
///
/// The serde representation is untagged so that JSON documents map directly
/// onto attributes: `null`, integers, floats, strings, string arrays,
/// number arrays and objects (groups). An empty JSON array reads as an empty
/// string array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attr {
    /// Absent or invalid value.
    #[default]
    Null,
    /// Signed 64-bit integer.
    Int(i64),
    /// Double precision float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Array of UTF-8 strings.
    StringArray(Vec<String>),
    /// Array of doubles (bounds, matrices, point data).
    FloatArray(Vec<f64>),
    /// Named children ordered by name.
    Group(GroupAttr),
}

impl Attr {
    /// Returns `true` for [`Attr::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a float; integers are widened.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the values of a numeric array.
    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Self::FloatArray(v) => Some(v),
            Self::StringArray(v) if v.is_empty() => Some(&[]),
            _ => None,
        }
    }

    /// Returns the group, if this is a group.
    pub fn as_group(&self) -> Option<&GroupAttr> {
        match self {
            Self::Group(g) => Some(g),
            _ => None,
        }
    }

    /// Returns the values of a string or string-array attribute.
    ///
    /// A single string is treated as a one-element array.
    pub fn as_strings(&self) -> Option<Vec<&str>> {
        match self {
            Self::String(s) => Some(vec![s.as_str()]),
            Self::StringArray(v) => Some(v.iter().map(String::as_str).collect()),
            _ => None,
        }
    }

    /// Stable, domain-separated BLAKE3 digest of this value.
    #[must_use]
    pub fn digest(&self) -> Hash {
        let mut hasher = Hasher::new();
        hasher.update(b"attr:");
        self.hash_into(&mut hasher);
        hasher.finalize().into()
    }

    pub(crate) fn hash_into(&self, hasher: &mut Hasher) {
        match self {
            Self::Null => {
                hasher.update(&[0]);
            }
            Self::Int(v) => {
                hasher.update(&[1]);
                hasher.update(&v.to_le_bytes());
            }
            Self::Float(v) => {
                hasher.update(&[2]);
                hasher.update(&v.to_bits().to_le_bytes());
            }
            Self::String(s) => {
                hasher.update(&[3]);
                hash_str(hasher, s);
            }
            Self::StringArray(values) => {
                hasher.update(&[4]);
                hasher.update(&(values.len() as u64).to_le_bytes());
                for s in values {
                    hash_str(hasher, s);
                }
            }
            Self::FloatArray(values) => {
                hasher.update(&[6]);
                hasher.update(&(values.len() as u64).to_le_bytes());
                for v in values {
                    hasher.update(&v.to_bits().to_le_bytes());
                }
            }
            Self::Group(group) => {
                hasher.update(&[5]);
                group.hash_into(hasher);
            }
        }
    }
}

fn hash_str(hasher: &mut Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

impl From<i64> for Attr {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Attr {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Attr {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Attr {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<String>> for Attr {
    fn from(value: Vec<String>) -> Self {
        Self::StringArray(value)
    }
}

impl From<Vec<f64>> for Attr {
    fn from(value: Vec<f64>) -> Self {
        Self::FloatArray(value)
    }
}

impl From<GroupAttr> for Attr {
    fn from(value: GroupAttr) -> Self {
        Self::Group(value)
    }
}

/// A group of named child attributes.
///
/// Children are kept in name order so iteration and digests are stable.
/// Dotted paths (`"a.b.c"`) address nested groups.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupAttr {
    children: BTreeMap<String, Attr>,
}

impl GroupAttr {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of direct children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns `true` when the group has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns a direct child by name.
    pub fn child(&self, name: &str) -> Option<&Attr> {
        self.children.get(name)
    }

    /// Iterates direct children in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attr)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Looks up a nested attribute by dotted path.
    pub fn get(&self, path: &str) -> Option<&Attr> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.children.get(first)?;
        for part in parts {
            current = current.as_group()?.children.get(part)?;
        }
        Some(current)
    }

    /// Sets an attribute at a dotted path, creating intermediate groups.
    ///
    /// A non-group value standing where an intermediate group is needed is
    /// replaced by a group.
    pub fn set(&mut self, path: &str, value: impl Into<Attr>) {
        let value = value.into();
        match path.split_once('.') {
            None => {
                self.children.insert(path.to_owned(), value);
            }
            Some((head, rest)) => {
                let entry = self
                    .children
                    .entry(head.to_owned())
                    .or_insert_with(|| Attr::Group(Self::new()));
                if !matches!(entry, Attr::Group(_)) {
                    *entry = Attr::Group(Self::new());
                }
                if let Attr::Group(group) = entry {
                    group.set(rest, value);
                }
            }
        }
    }

    /// Removes the attribute at a dotted path and returns it.
    pub fn remove(&mut self, path: &str) -> Option<Attr> {
        match path.split_once('.') {
            None => self.children.remove(path),
            Some((head, rest)) => match self.children.get_mut(head) {
                Some(Attr::Group(group)) => group.remove(rest),
                _ => None,
            },
        }
    }

    /// Merges `other` into `self`; `other` wins on conflicts and nested groups
    /// are merged recursively.
    pub fn deep_merge(&mut self, other: &Self) {
        for (name, value) in &other.children {
            match (self.children.get_mut(name), value) {
                (Some(Attr::Group(mine)), Attr::Group(theirs)) => mine.deep_merge(theirs),
                _ => {
                    self.children.insert(name.clone(), value.clone());
                }
            }
        }
    }

    /// Stable, domain-separated BLAKE3 digest of this group.
    #[must_use]
    pub fn digest(&self) -> Hash {
        let mut hasher = Hasher::new();
        hasher.update(b"group:");
        self.hash_into(&mut hasher);
        hasher.finalize().into()
    }

    pub(crate) fn hash_into(&self, hasher: &mut Hasher) {
        hasher.update(&(self.children.len() as u64).to_le_bytes());
        for (name, value) in &self.children {
            hash_str(hasher, name);
            value.hash_into(hasher);
        }
    }
}

impl FromIterator<(String, Attr)> for GroupAttr {
    fn from_iter<I: IntoIterator<Item = (String, Attr)>>(iter: I) -> Self {
        Self {
            children: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a GroupAttr {
    type Item = (&'a String, &'a Attr);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Attr>;

    fn into_iter(self) -> Self::IntoIter {
        self.children.iter()
    }
}
