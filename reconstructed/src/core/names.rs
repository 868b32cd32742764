//! Validation rules for variable identifiers and group names.

use std::sync::LazyLock;

use regex::Regex;

/// Words the template engine gives a meaning of its own. Identifiers are
/// ASCII-only and exclude these Jinja words rather than host-language keywords.
const RESERVED: [&str; 13] = [
    "true", "false", "none", "True", "False", "None", "and", "or", "not", "in", "is", "if",
    "else",
];

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"));

static INVALID_GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]|[^A-Za-z0-9_]").expect("group name regex"));

/// True if `name` can be used as a variable name.
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name) && !RESERVED.contains(&name)
}

/// True if `name` (already trimmed) can be used as a group name.
pub fn is_valid_group_name(name: &str) -> bool {
    !name.is_empty() && !INVALID_GROUP_RE.is_match(name)
}
