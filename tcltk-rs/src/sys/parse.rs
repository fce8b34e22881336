//! Word-level syntax shared by the list representation and the script
//! evaluator: backslash sequences, list splitting and element quoting.

/// Decode the backslash sequence starting at byte `i` of `s` (which must be
/// a `\`).  Returns the replacement text and the index just past the
/// sequence.
pub(super) fn backslash_subst(s: &str, i: usize) -> (String, usize) {
    let bytes = s.as_bytes();
    debug_assert_eq!(bytes[i], b'\\');
    let Some(c) = s[i + 1..].chars().next() else {
        return ("\\".to_owned(), i + 1);
    };
    let next = i + 1 + c.len_utf8();
    let simple = |ch: char| (ch.to_string(), next);
    match c {
        'a' => simple('\x07'),
        'b' => simple('\x08'),
        'f' => simple('\x0c'),
        'n' => simple('\n'),
        'r' => simple('\r'),
        't' => simple('\t'),
        'v' => simple('\x0b'),
        '\n' => {
            let mut j = next;
            while j < bytes.len() && (bytes[j] == b' ' || bytes[j] == b'\t') {
                j += 1;
            }
            (" ".to_owned(), j)
        }
        'x' => hex_escape(s, next, 2).unwrap_or_else(|| simple('x')),
        'u' => hex_escape(s, next, 4).unwrap_or_else(|| simple('u')),
        '0'..='7' => {
            let mut j = i + 1;
            let mut value = 0u32;
            while j < bytes.len() && j < i + 4 && (b'0'..=b'7').contains(&bytes[j]) {
                value = value * 8 + u32::from(bytes[j] - b'0');
                j += 1;
            }
            let ch = char::from_u32(value & 0xff).unwrap_or('\0');
            (ch.to_string(), j)
        }
        other => simple(other),
    }
}

fn hex_escape(s: &str, start: usize, max_digits: usize) -> Option<(String, usize)> {
    let digits: String = s[start..]
        .chars()
        .take(max_digits)
        .take_while(char::is_ascii_hexdigit)
        .collect();
    if digits.is_empty() {
        return None;
    }
    let value = u32::from_str_radix(&digits, 16).ok()?;
    let ch = char::from_u32(value).unwrap_or('\u{fffd}');
    Some((ch.to_string(), start + digits.len()))
}

fn is_list_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0b' | b'\x0c')
}

/// Split a string in Tcl list syntax into its elements.
///
/// Braced elements are taken literally, quoted and bare elements undergo
/// backslash substitution.  No variable or command substitution happens.
pub fn split_list(s: &str) -> Result<Vec<String>, String> {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    loop {
        while i < bytes.len() && is_list_space(bytes[i]) {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        match bytes[i] {
            b'{' => {
                let start = i + 1;
                let mut depth = 1;
                i = start;
                while i < bytes.len() {
                    match bytes[i] {
                        b'\\' => i += 1,
                        b'{' => depth += 1,
                        b'}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                if depth != 0 || i >= bytes.len() {
                    return Err("unmatched open brace in list".to_owned());
                }
                out.push(s[start..i].to_owned());
                i += 1;
                if i < bytes.len() && !is_list_space(bytes[i]) {
                    return Err(format!(
                        "list element in braces followed by \"{}\" instead of space",
                        trailing(s, i)
                    ));
                }
            }
            b'"' => {
                let mut elem = String::new();
                i += 1;
                loop {
                    if i >= bytes.len() {
                        return Err("unmatched open quote in list".to_owned());
                    }
                    match bytes[i] {
                        b'"' => break,
                        b'\\' => {
                            let (text, next) = backslash_subst(s, i);
                            elem.push_str(&text);
                            i = next;
                        }
                        _ => {
                            let ch = s[i..].chars().next().unwrap_or_default();
                            elem.push(ch);
                            i += ch.len_utf8();
                        }
                    }
                }
                out.push(elem);
                i += 1;
                if i < bytes.len() && !is_list_space(bytes[i]) {
                    return Err(format!(
                        "list element in quotes followed by \"{}\" instead of space",
                        trailing(s, i)
                    ));
                }
            }
            _ => {
                let mut elem = String::new();
                while i < bytes.len() && !is_list_space(bytes[i]) {
                    if bytes[i] == b'\\' {
                        let (text, next) = backslash_subst(s, i);
                        elem.push_str(&text);
                        i = next;
                    } else {
                        let ch = s[i..].chars().next().unwrap_or_default();
                        elem.push(ch);
                        i += ch.len_utf8();
                    }
                }
                out.push(elem);
            }
        }
    }
    Ok(out)
}

fn trailing(s: &str, i: usize) -> String {
    s[i..].chars().take_while(|c| !c.is_whitespace()).collect()
}

fn needs_quoting(c: char) -> bool {
    c.is_whitespace() || matches!(c, '{' | '}' | '[' | ']' | '$' | '"' | '\\' | ';')
}

/// True when `s` survives being wrapped in braces unchanged.
fn brace_safe(s: &str) -> bool {
    let mut depth = 0i32;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                None | Some('\n') => return false,
                Some(_) => {}
            },
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

/// Quote `s` so that it parses back as exactly one list element (or one
/// command word).
pub fn quote_element(s: &str) -> String {
    if s.is_empty() {
        return "{}".to_owned();
    }
    if !s.starts_with('#') && !s.chars().any(needs_quoting) {
        return s.to_owned();
    }
    if brace_safe(s) {
        return format!("{{{s}}}");
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if needs_quoting(c) || c == '#' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
