//! Rejects zero-content "folder" placeholders whose key ends with `/`.

use tracing::debug;

use crate::types::{ListedObject, SelectionCriteria};

const FILTER_NAME: &str = "DirectoryMarkerFilter";

pub fn is_not_directory_marker(object: &ListedObject, _criteria: &SelectionCriteria) -> bool {
    if object.key.ends_with('/') {
        debug!(name = FILTER_NAME, key = object.key, "object filtered.");
        return false;
    }

    true
}
