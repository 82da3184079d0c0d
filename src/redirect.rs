//! Anti-scrape redirect stubs
//!
//! On a first visit some trackers serve a script-only page that assigns
//! `window.location` instead of the real content.

const LOCATION: &str = "window.location";
const ASSIGNMENT: &str = "window.location=";

/// True if the page has no title at all, i.e. it is not real content
pub fn is_redirect_stub(html: &str) -> bool {
    !html.contains("title")
}

/// Extract the same-origin target of a `window.location=...;` assignment.
///
/// Double quotes, `+` and spaces are stripped from the expression, then the
/// `window.location=` prefix. Returns `None` when there is no assignment,
/// no terminating `;`, or nothing left after stripping.
pub fn redirect_target(html: &str) -> Option<String> {
    let start = html.find(LOCATION)?;
    let end = start + html[start..].find(';')?;

    let expr: String = html[start..end]
        .chars()
        .filter(|c| !matches!(c, '"' | '+' | ' '))
        .collect();

    let target = expr.strip_prefix(ASSIGNMENT)?.replace(ASSIGNMENT, "");
    if target.is_empty() {
        return None;
    }
    Some(target)
}

/// Join a stub target onto the site URL.
///
/// Plain concatenation, the target is always relative to the site root.
pub fn derive_url(base: &str, target: &str) -> String {
    format!("{}{}", base, target)
}
