//! Rejects objects that already are archives, so output is never re-archived.

use tracing::debug;

use crate::types::{ListedObject, SelectionCriteria, has_archive_extension};

const FILTER_NAME: &str = "ArchiveExtensionFilter";

pub fn is_not_archive(object: &ListedObject, _criteria: &SelectionCriteria) -> bool {
    if has_archive_extension(&object.key) {
        debug!(name = FILTER_NAME, key = object.key, "object filtered.");
        return false;
    }

    true
}
