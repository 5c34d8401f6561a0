//! Property-based tests for the selection filters.
