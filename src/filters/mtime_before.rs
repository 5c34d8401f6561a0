//! Modified-time filter.
//!
//! Passes objects whose last_modified time is strictly before the cutoff. An
//! object modified exactly at the cutoff is not old enough.

use tracing::debug;

use crate::types::{ListedObject, SelectionCriteria};

const FILTER_NAME: &str = "MtimeBeforeFilter";

pub fn is_before(object: &ListedObject, criteria: &SelectionCriteria) -> bool {
    if criteria.cutoff <= object.last_modified {
        debug!(
            name = FILTER_NAME,
            key = object.key,
            last_modified = object.last_modified.to_rfc3339(),
            cutoff = criteria.cutoff.to_rfc3339(),
            "object filtered."
        );

        return false;
    }

    true
}
