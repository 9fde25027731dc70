//! Filler phrases spoken while the backend is thinking.

/// Placeholder replaced by the user's (truncated) words.
pub const INPUT_PLACEHOLDER: &str = "{{input}}";

/// User text longer than this many characters is cut and suffixed with `...`.
pub const MAX_ECHO_CHARS: usize = 80;

/// Render `template`, substituting every `{{input}}` with `user_text`.
pub fn filler_phrase(template: &str, user_text: &str) -> String {
    template.replace(INPUT_PLACEHOLDER, &truncate_echo(user_text.trim()))
}

fn truncate_echo(text: &str) -> String {
    if text.chars().count() <= MAX_ECHO_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_ECHO_CHARS).collect();
    out.push_str("...");
    out
}
