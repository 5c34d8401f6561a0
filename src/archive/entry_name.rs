use std::collections::HashSet;

/// Assigns flat, unique entry names within one archive.
///
/// The base name is the final path segment of the key. A name already taken
/// gets `_N` inserted before its extension, N counting up from 1 and skipping
/// names that are themselves taken. Given the same key order the result is
/// always the same.
#[derive(Debug, Default)]
pub struct EntryNamer {
    used: HashSet<String>,
}

impl EntryNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, key: &str) -> String {
        let base_name = base_name(key);
        if self.used.insert(base_name.clone()) {
            return base_name;
        }

        let (stem, extension) = split_extension(&base_name);
        let mut counter: u64 = 1;
        loop {
            let candidate = format!("{stem}_{counter}{extension}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

fn base_name(key: &str) -> String {
    match key.rsplit('/').next() {
        Some(segment) if !segment.is_empty() => segment.to_string(),
        _ => key.replace('/', "_").trim_matches('_').to_string(),
    }
}

// A leading dot belongs to the stem (".env" has no extension).
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        _ => (name, ""),
    }
}
