// src/utils/html.rs

/// Sanitizes user supplied rich text before it is stored.
///
/// Whitelist based: formatting tags such as `<b>` or `<p>` survive, while
/// `<script>`, `<iframe>` and event handler attributes are stripped.
/// Surrounding whitespace is trimmed so that a blank body stays blank.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input.trim())
}
