use std::sync::LazyLock;

use regex::Regex;

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9 -]").expect("static pattern"));
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ -]+").expect("static pattern"));

/// Derives the `user_data` key for a field label.
///
/// Lowercases, drops everything outside `[a-z0-9 -]`, collapses runs of
/// spaces and hyphens into one underscore and trims underscores at the ends.
pub fn slugify(label: &str) -> String {
    let lowered = label.to_lowercase();
    let kept = DISALLOWED.replace_all(&lowered, "");
    let joined = SEPARATORS.replace_all(&kept, "_");
    joined.trim_matches('_').to_string()
}
