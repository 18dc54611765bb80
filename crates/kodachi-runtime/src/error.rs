// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use thiserror::Error;

use crate::host::HostError;

/// Errors raised by runtime, client and op operations.
///
/// Skippable problems inside a commit (missing backing ops, duplicate ids,
/// dangling inputs) are logged rather than returned; only conditions that
/// make the requested operation impossible surface here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The owning runtime has been dropped.
    #[error("kodachi runtime has expired")]
    RuntimeExpired,
    /// The client has not been part of a successful commit yet.
    #[error("client has not been committed")]
    ClientNotCommitted,
    /// The client was committed but no op has been bound to it.
    #[error("client has no op bound")]
    ClientOpNotSet,
    /// The transaction was created by a different runtime.
    #[error("transaction belongs to a different runtime")]
    ForeignTransaction,
    /// Host engine failure.
    #[error(transparent)]
    Host(#[from] HostError),
}
