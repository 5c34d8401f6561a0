//! Rejects objects with no content.

use tracing::debug;

use crate::types::{ListedObject, SelectionCriteria};

const FILTER_NAME: &str = "EmptyObjectFilter";

pub fn is_not_empty(object: &ListedObject, _criteria: &SelectionCriteria) -> bool {
    if object.size <= 0 {
        debug!(
            name = FILTER_NAME,
            key = object.key,
            size = object.size,
            "object filtered."
        );
        return false;
    }

    true
}
