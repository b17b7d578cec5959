use itertools::Itertools;

/// build a `?, ?, ...` placeholder list for an `in (...)` clause
pub fn placeholder_list(count: usize) -> String {
    (0..count).map(|_| "?").join(", ")
}
