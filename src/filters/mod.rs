//! Eligibility filters applied to every listed object during a scan.
//!
//! Each filter is a pure predicate over a [`ListedObject`] and the run's
//! [`SelectionCriteria`]. An object becomes a candidate only when every
//! filter accepts it (logical AND). The first rejecting filter logs the
//! reason at debug level.

use crate::types::{ListedObject, SelectionCriteria};

pub mod archive_extension;
pub mod directory_marker;
pub mod empty_object;
mod filter_properties;
pub mod mtime_before;

/// Signature shared by all selection filters.
pub type FilterFn = fn(&ListedObject, &SelectionCriteria) -> bool;

const FILTER_CHAIN: [FilterFn; 4] = [
    directory_marker::is_not_directory_marker,
    empty_object::is_not_empty,
    archive_extension::is_not_archive,
    mtime_before::is_before,
];

/// Returns `true` when the object passes every filter.
pub fn is_candidate(object: &ListedObject, criteria: &SelectionCriteria) -> bool {
    FILTER_CHAIN.iter().all(|filter| filter(object, criteria))
}
