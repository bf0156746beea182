// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types.

use std::collections::TryReserveError;

use brushwork_tree::ConsistencyError;

/// Failure that aborts a whole evaluation cycle.
///
/// When a cycle fails the hierarchy keeps its pending flags and every brush keeps
/// its previous render buffer, so the next [`update`](crate::CsgTree::update)
/// retries the same work.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// The hierarchy failed its consistency check.
    #[error("hierarchy is inconsistent: {0}")]
    Inconsistent(#[from] ConsistencyError),
    /// A scratch allocation failed.
    #[error("out of memory while reserving cycle scratch")]
    OutOfMemory(#[from] TryReserveError),
    /// A scratch hash table could not grow.
    #[error("out of memory while reserving cycle lookup tables")]
    TableOutOfMemory(hashbrown::TryReserveError),
}

// hashbrown's error carries no `Error` impl, so it cannot be a `#[from]` source.
impl From<hashbrown::TryReserveError> for CycleError {
    fn from(err: hashbrown::TryReserveError) -> Self {
        Self::TableOutOfMemory(err)
    }
}

/// Reasons a set of planes does not describe a usable convex solid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    /// A solid needs at least four planes.
    #[error("a brush needs at least 4 planes, got {0}")]
    TooFewPlanes(usize),
    /// A plane has a zero-length or non-finite normal, or a non-finite distance.
    #[error("plane {0} is not finite or has a zero normal")]
    NonFinitePlane(usize),
    /// The half-spaces do not enclose a bounded region.
    #[error("planes do not enclose a bounded region")]
    Unbounded,
    /// The enclosed region is empty or flat.
    #[error("planes enclose an empty or flat region")]
    Degenerate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn table_reservation_failure_converts_without_a_source() {
        let err = CycleError::from(hashbrown::TryReserveError::CapacityOverflow);
        assert!(matches!(err, CycleError::TableOutOfMemory(_)));
        assert!(err.source().is_none());
        assert_eq!(
            err.to_string(),
            "out of memory while reserving cycle lookup tables"
        );
    }

    #[test]
    fn oversized_table_reservation_is_reported() {
        let mut table: hashbrown::HashMap<u64, u64> = hashbrown::HashMap::new();
        let err = table.try_reserve(usize::MAX).map_err(CycleError::from);
        assert!(matches!(err, Err(CycleError::TableOutOfMemory(_))));
    }
}
