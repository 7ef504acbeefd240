//! Filesystem-safe slugs for category folders and answer filenames.

/// Hard cap on slug length, matching the original export layout.
pub const MAX_SLUG_LEN: usize = 80;

/// Turn a title into a filesystem-safe slug.
///
/// Lowercases, keeps unicode alphanumerics, collapses every other run of
/// characters into a single `-`, trims dashes from both ends, and caps the
/// result at [`MAX_SLUG_LEN`] characters. An empty result (all punctuation,
/// empty input) becomes `"untitled"`.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            out.push(c);
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }

    if out.chars().count() > MAX_SLUG_LEN {
        out = out.chars().take(MAX_SLUG_LEN).collect();
        while out.ends_with('-') {
            out.pop();
        }
    }

    if out.is_empty() { "untitled".into() } else { out }
}
