use std::borrow::Cow;

/// Percent-escapes `%` and `separator` so ids joined by `separator` split back
/// into exactly the ids that were joined.
pub fn escape_segment(id: &str, separator: char) -> Cow<'_, str> {
    if !id.contains(|c| c == '%' || c == separator) {
        return Cow::Borrowed(id);
    }
    let mut escaped = String::with_capacity(id.len() + 4);
    for c in id.chars() {
        if c == '%' || c == separator {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                escaped.push_str(&format!("%{:02X}", byte));
            }
        } else {
            escaped.push(c);
        }
    }
    Cow::Owned(escaped)
}

/// Joins ids with `separator`, escaping each one.
pub fn join_segments(segments: &[&str], separator: char) -> String {
    segments
        .iter()
        .map(|s| escape_segment(s, separator))
        .collect::<Vec<_>>()
        .join(separator.to_string().as_str())
}
