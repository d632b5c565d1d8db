//! Advisory order locks for interactive editing.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::value_objects::Actor;

/// A short-lived advisory lock held by an editor on one order.
///
/// At most one live lock exists per order, enforced by a uniqueness
/// constraint at the store level. The creation timestamp doubles as the lock
/// instance identity: a live lock with a different timestamp than the one a
/// caller holds means a different lock instance has since been taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLock {
    /// The locked order.
    pub order_id: OrderId,

    /// The editor holding the lock.
    pub locked_by: Actor,

    /// When the lock was taken.
    pub created_at: DateTime<Utc>,
}

impl OrderLock {
    /// Creates a lock for an order.
    pub fn new(order_id: OrderId, locked_by: Actor, created_at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            locked_by,
            created_at,
        }
    }
}

/// Outcome of validating a lock a caller holds, returned directly from the
/// validation call rather than stashed in service state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockValidation {
    /// The caller's lock is the live lock and the order is unchanged.
    ValidatedSuccessfully,
    /// The order was modified after the caller opened it for edit.
    OrderWasModified,
    /// A different editor holds the live lock.
    OrderIsLocked,
    /// No live lock exists any more.
    OrderWasUnlocked,
    /// A live lock exists for the same editor but is a different instance.
    LockIsAlien,
}

impl LockValidation {
    /// Returns the outcome name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            LockValidation::ValidatedSuccessfully => "ValidatedSuccessfully",
            LockValidation::OrderWasModified => "OrderWasModified",
            LockValidation::OrderIsLocked => "OrderIsLocked",
            LockValidation::OrderWasUnlocked => "OrderWasUnlocked",
            LockValidation::LockIsAlien => "LockIsAlien",
        }
    }
}

impl std::fmt::Display for LockValidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
