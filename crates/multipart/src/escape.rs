use std::borrow::Cow;

/// Escapes `\` and `"` with a backslash so `s` can be embedded in a quoted
/// `Content-Disposition` parameter.
pub fn escape_quotes(s: &str) -> Cow<'_, str> {
    if !s.contains(['\\', '"']) {
        return Cow::Borrowed(s);
    }

    let mut escaped = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        if matches!(c, '\\' | '"') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}
