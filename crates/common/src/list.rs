//! List syntax: splitting a string into elements and formatting elements
//! back into a string that splits the same way.

use crate::error::ListError;

fn is_list_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

fn is_special(c: char) -> bool {
    is_list_space(c) || matches!(c, '{' | '}' | '[' | ']' | '$' | ';' | '\\' | '"')
}

/// Split a string into list elements.
pub fn split_list(text: &str) -> Result<Vec<String>, ListError> {
    let chars: Vec<char> = text.chars().collect();
    let mut elements = Vec::new();
    let mut i = 0;

    loop {
        while i < chars.len() && is_list_space(chars[i]) {
            i += 1;
        }
        if i >= chars.len() {
            return Ok(elements);
        }

        let (element, next) = match chars[i] {
            '{' => braced_element(&chars, i)?,
            '"' => quoted_element(&chars, i)?,
            _ => bare_element(&chars, i),
        };
        elements.push(element);
        i = next;
    }
}

fn trailing_garbage(chars: &[char], from: usize) -> String {
    chars[from..]
        .iter()
        .take_while(|c| !is_list_space(**c))
        .take(20)
        .collect()
}

fn braced_element(chars: &[char], open: usize) -> Result<(String, usize), ListError> {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let element: String = chars[open + 1..i].iter().collect();
                    let next = i + 1;
                    if next < chars.len() && !is_list_space(chars[next]) {
                        return Err(ListError::BraceFollowedBy(trailing_garbage(chars, next)));
                    }
                    return Ok((element, next));
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(ListError::UnmatchedBrace)
}

fn quoted_element(chars: &[char], open: usize) -> Result<(String, usize), ListError> {
    let mut element = String::new();
    let mut i = open + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i = backslash(chars, i, &mut element),
            '"' => {
                let next = i + 1;
                if next < chars.len() && !is_list_space(chars[next]) {
                    return Err(ListError::QuoteFollowedBy(trailing_garbage(chars, next)));
                }
                return Ok((element, next));
            }
            c => {
                element.push(c);
                i += 1;
            }
        }
    }
    Err(ListError::UnmatchedQuote)
}

fn bare_element(chars: &[char], start: usize) -> (String, usize) {
    let mut element = String::new();
    let mut i = start;
    while i < chars.len() && !is_list_space(chars[i]) {
        if chars[i] == '\\' {
            i = backslash(chars, i, &mut element);
        } else {
            element.push(chars[i]);
            i += 1;
        }
    }
    (element, i)
}

/// Substitute the backslash sequence at `at`, returning the index after it.
fn backslash(chars: &[char], at: usize, out: &mut String) -> usize {
    let Some(&c) = chars.get(at + 1) else {
        out.push('\\');
        return at + 1;
    };
    let simple = match c {
        'a' => Some('\x07'),
        'b' => Some('\x08'),
        'f' => Some('\x0c'),
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        'v' => Some('\x0b'),
        _ => None,
    };
    if let Some(sub) = simple {
        out.push(sub);
        return at + 2;
    }

    match c {
        'x' | 'u' => {
            let max = if c == 'x' { 2 } else { 4 };
            let digits: String = chars[at + 2..]
                .iter()
                .take(max)
                .take_while(|d| d.is_ascii_hexdigit())
                .collect();
            match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                Some(sub) if !digits.is_empty() => {
                    out.push(sub);
                    at + 2 + digits.len()
                }
                _ => {
                    out.push(c);
                    at + 2
                }
            }
        }
        '0'..='7' => {
            let digits: String = chars[at + 1..]
                .iter()
                .take(3)
                .take_while(|d| ('0'..='7').contains(*d))
                .collect();
            let code = u32::from_str_radix(&digits, 8).unwrap_or(0) & 0xff;
            out.push(char::from_u32(code).unwrap_or('\0'));
            at + 1 + digits.len()
        }
        '\n' => {
            let mut i = at + 2;
            while i < chars.len() && matches!(chars[i], ' ' | '\t') {
                i += 1;
            }
            out.push(' ');
            i
        }
        other => {
            out.push(other);
            at + 2
        }
    }
}

/// Whether `element` can be wrapped in braces and split back unchanged.
fn can_brace(element: &str) -> bool {
    let mut depth = 0i64;
    let mut chars = element.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if chars.next().is_none() {
                    return false;
                }
            }
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Quote one element so it splits back as a single, unchanged element.
pub fn quote_element(element: &str) -> String {
    if element.is_empty() {
        return "{}".to_string();
    }
    if !element.starts_with('#') && !element.chars().any(is_special) {
        return element.to_string();
    }
    if can_brace(element) {
        return format!("{{{element}}}");
    }

    let mut out = String::with_capacity(element.len() * 2);
    for c in element.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\x0b' => out.push_str("\\v"),
            '\x0c' => out.push_str("\\f"),
            c if is_special(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Join elements into list syntax.
pub fn format_list<S: AsRef<str>>(elements: &[S]) -> String {
    elements
        .iter()
        .map(|e| quote_element(e.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve an index (`3`, `end`, `end-1`, `end+2`) against a length.
///
/// The result may be out of range; callers decide what that means.
pub fn resolve_index(spec: &str, len: usize) -> Result<i64, ListError> {
    let bad = || ListError::BadIndex(spec.to_string());
    let trimmed = spec.trim();
    if let Some(rest) = trimmed.strip_prefix("end") {
        let last = len as i64 - 1;
        if rest.is_empty() {
            return Ok(last);
        }
        let (sign, digits) = match rest.as_bytes()[0] {
            b'-' => (-1, &rest[1..]),
            b'+' => (1, &rest[1..]),
            _ => return Err(bad()),
        };
        let offset: i64 = digits.parse().map_err(|_| bad())?;
        return Ok(last + sign * offset);
    }
    match crate::number::parse_number(trimmed) {
        Ok(n) => n.as_i64().ok_or_else(bad),
        Err(_) => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_simple_words() {
        assert_eq!(split_list("  a b\tc\n").unwrap(), vec!["a", "b", "c"]);
        assert!(split_list("").unwrap().is_empty());
    }

    #[test]
    fn split_braces_keep_contents_literal() {
        assert_eq!(
            split_list("{a b} {x {y z}} {\\n}").unwrap(),
            vec!["a b", "x {y z}", "\\n"]
        );
    }

    #[test]
    fn split_quotes_substitute_backslashes() {
        assert_eq!(split_list("\"a\\tb\" c\\ d").unwrap(), vec!["a\tb", "c d"]);
        assert_eq!(split_list("\\x41\\u00e9\\101").unwrap(), vec!["AéA"]);
    }

    #[test]
    fn split_errors() {
        assert_eq!(split_list("{a b"), Err(ListError::UnmatchedBrace));
        assert_eq!(split_list("\"a b"), Err(ListError::UnmatchedQuote));
        assert_eq!(
            split_list("{a}b c"),
            Err(ListError::BraceFollowedBy("b".to_string()))
        );
        assert_eq!(
            split_list("\"a\"xy"),
            Err(ListError::QuoteFollowedBy("xy".to_string()))
        );
    }

    #[test]
    fn quoting() {
        assert_eq!(quote_element("abc"), "abc");
        assert_eq!(quote_element(""), "{}");
        assert_eq!(quote_element("a b"), "{a b}");
        assert_eq!(quote_element("#x"), "{#x}");
        assert_eq!(quote_element("a{b"), "a\\{b");
        assert_eq!(quote_element("x\\"), "x\\\\");
    }

    #[test]
    fn format_then_split() {
        let elements = vec!["a", "", "b c", "}{", "\\", "#", "q\"t"];
        assert_eq!(split_list(&format_list(&elements)).unwrap(), elements);
    }

    #[test]
    fn indices() {
        assert_eq!(resolve_index("2", 5), Ok(2));
        assert_eq!(resolve_index("end", 5), Ok(4));
        assert_eq!(resolve_index("end-1", 5), Ok(3));
        assert_eq!(resolve_index("end+1", 5), Ok(5));
        assert_eq!(resolve_index("end", 0), Ok(-1));
        assert_eq!(
            resolve_index("last", 5),
            Err(ListError::BadIndex("last".to_string()))
        );
        assert!(resolve_index("end-x", 5).is_err());
        assert!(resolve_index("1.5", 5).is_err());
    }
}
