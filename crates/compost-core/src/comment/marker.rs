//! Tag marker embedded in posted comment bodies.
//!
//! The marker is a Markdown link-reference definition, `[//]: <> (TAG)`,
//! which neither GitHub nor GitLab renders. It sits on the first line so a
//! freshly rendered body can be compared byte-for-byte with a stored one.

/// The invisible marker line for `tag`.
pub fn tag_marker(tag: &str) -> String {
    format!("[//]: <> ({tag})")
}

/// Prefix `body` with the marker for `tag`.
pub fn render(body: &str, tag: &str) -> String {
    format!("{}\n{body}", tag_marker(tag))
}

/// True if `body` carries the marker for `tag`.
pub fn has_tag(body: &str, tag: &str) -> bool {
    body.contains(&tag_marker(tag))
}
