/// Characters of a token that may be echoed back in diagnostics.
pub const PREVIEW_CHARS: usize = 8;

/// First [`PREVIEW_CHARS`] characters of `token` followed by `...`.
///
/// Never returns the full value, even for short inputs.
pub fn token_preview(token: &str) -> String {
    let head: String = token.chars().take(PREVIEW_CHARS).collect();
    if token.chars().count() > PREVIEW_CHARS {
        format!("{head}...")
    } else {
        "...".to_string()
    }
}
