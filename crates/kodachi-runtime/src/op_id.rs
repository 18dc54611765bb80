// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Globally unique op identifiers.
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::{Uuid, Variant};

/// Error returned when parsing an [`OpId`] from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpIdError {
    /// The text is not a UUID.
    #[error("malformed op id: {0:?}")]
    Malformed(String),
    /// The text parsed to the nil UUID, which never names an op.
    #[error("nil op id")]
    Nil,
}

/// Strongly typed identifier for an op.
///
/// Two `OpId`s compare equal iff they name the same logical op in every
/// graph replica. Ids are random (UUIDv4) so independently built graph
/// descriptions can be merged without coordination. The textual form is the
/// hyphenated lower-case UUID and is what graph descriptions use as keys.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(Uuid);

impl OpId {
    /// Generates a fresh id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The nil id. Never valid.
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Parses the textual form, rejecting malformed and nil ids.
    pub fn parse(text: &str) -> Result<Self, OpIdError> {
        let uuid = Uuid::parse_str(text).map_err(|_| OpIdError::Malformed(text.to_owned()))?;
        let id = Self(uuid);
        if id.0.is_nil() {
            return Err(OpIdError::Nil);
        }
        Ok(id)
    }

    /// Returns `true` if this is a well-formed, non-nil RFC 4122 id.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.is_nil() && self.0.get_variant() == Variant::RFC4122
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for OpId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for OpId {
    type Err = OpIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl core::fmt::Display for OpId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl core::fmt::Debug for OpId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "OpId({})", self.0.hyphenated())
    }
}
