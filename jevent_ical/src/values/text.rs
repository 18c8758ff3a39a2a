//! TEXT value data type (RFC 5545 §3.3.11).
//!
//! ```text
//! text       = *(TSAFE-CHAR / ":" / DQUOTE / ESCAPED-CHAR)
//! ESCAPED-CHAR = ("\\" / "\;" / "\," / "\N" / "\n")
//! ```
//!
//! Backslash, semicolon, comma and newline are escaped on the wire; every
//! other octet passes through unchanged.

pub fn escape(value: &str) -> String {
    let mut output = String::with_capacity(value.len());

    for ch in value.chars() {
        match ch {
            '\\' => output.push_str("\\\\"),
            ';' => output.push_str("\\;"),
            ',' => output.push_str("\\,"),
            '\n' => output.push_str("\\n"),
            _ => output.push(ch),
        }
    }

    output
}

pub fn unescape(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.peek() {
                Some('\\') => {
                    output.push('\\');
                    chars.next();
                }
                Some(';') => {
                    output.push(';');
                    chars.next();
                }
                Some(',') => {
                    output.push(',');
                    chars.next();
                }
                Some('n') | Some('N') => {
                    output.push('\n');
                    chars.next();
                }
                _ => output.push('\\'),
            }
        } else {
            output.push(ch);
        }
    }

    output
}

/// Split a `TEXT` list value (RFC 5545 §3.1.1's "," separated list
/// grammar) on unescaped commas, then unescape each element.
pub fn split_list(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            current.push(ch);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if ch == ',' {
            parts.push(unescape(&current));
            current.clear();
        } else {
            current.push(ch);
        }
    }
    parts.push(unescape(&current));

    parts
}

pub fn join_list<I: IntoIterator<Item = S>, S: AsRef<str>>(values: I) -> String {
    values
        .into_iter()
        .map(|value| escape(value.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_and_unescape_round_trip() {
        let raw = "a, b; c\\d\ne";
        let escaped = escape(raw);
        assert_eq!(escaped, "a\\, b\\; c\\\\d\\ne");
        assert_eq!(unescape(&escaped), raw);
    }

    #[test]
    fn split_list_respects_escaped_commas() {
        assert_eq!(
            split_list(r"CATEGORY_ONE,CATEGORY_TWO,QUOTED\, THREE"),
            vec!["CATEGORY_ONE", "CATEGORY_TWO", "QUOTED, THREE"],
        );
    }
}
