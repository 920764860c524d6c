//! Command-line tokenizer for CTest registration files.
//!
//! CTest writes arguments in three forms: bare words, double-quoted strings
//! with backslash escapes, and bracket literals (`[==[ ... ]==]`) whose
//! content is taken verbatim.

/// Splits one logical command line into its arguments.
///
/// - Whitespace separates bare tokens.
/// - A backslash escapes the next character, inside or outside quotes.
/// - A double-quoted section ends its token at the closing quote; the quotes
///   themselves are not emitted.
/// - A bracket literal `[` + N×`=` + `[` ... `]` + N×`=` + `]` at the start of
///   a token becomes exactly one token with its content untouched.
///
/// Whitespace-only input yields an empty list.
pub fn parse_command_line(line: &str) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\\' {
            if let Some(&next) = chars.get(i + 1) {
                current.push(next);
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }

        if c == '"' {
            i = read_quoted(&chars, i + 1, &mut current);
            parts.push(std::mem::take(&mut current));
            continue;
        }

        if c == '[' && current.is_empty() {
            if let Some((content, end)) = read_bracket(&chars, i) {
                parts.push(content);
                i = end;
                continue;
            }
        }

        if c.is_whitespace() {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            i += 1;
            continue;
        }

        current.push(c);
        i += 1;
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

/// Returns true if `line` holds a `)` outside quotes and bracket literals,
/// i.e. the line closes the enclosing command.
pub fn closes_block(line: &str) -> bool {
    block_end(line).is_some()
}

/// Byte offset of the first `)` outside quotes and bracket literals.
pub fn block_end(line: &str) -> Option<usize> {
    let offsets: Vec<usize> = line.char_indices().map(|(offset, _)| offset).collect();
    let chars: Vec<char> = line.chars().collect();
    let mut scratch = String::new();
    let mut at_token_start = true;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                i += 2;
                at_token_start = false;
            }
            '"' => {
                i = read_quoted(&chars, i + 1, &mut scratch);
                at_token_start = false;
            }
            '[' if at_token_start => match read_bracket(&chars, i) {
                Some((_, end)) => {
                    i = end;
                    at_token_start = false;
                }
                None => {
                    i += 1;
                    at_token_start = false;
                }
            },
            ')' => return Some(offsets[i]),
            c if c.is_whitespace() || c == '(' => {
                i += 1;
                at_token_start = true;
            }
            _ => {
                i += 1;
                at_token_start = false;
            }
        }
    }

    None
}

/// Reads a quoted section starting just after the opening quote. Returns the
/// index just past the closing quote (or the end of input when unterminated).
fn read_quoted(chars: &[char], mut i: usize, out: &mut String) -> usize {
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                }
                i += 2;
            }
            '"' => return i + 1,
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    chars.len()
}

/// Reads a bracket literal opening at `start`. Returns its content and the
/// index just past the closing delimiter, or `None` if `start` does not open
/// a terminated bracket literal.
fn read_bracket(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut i = start + 1;
    let mut level = 0;
    while chars.get(i) == Some(&'=') {
        level += 1;
        i += 1;
    }
    if chars.get(i) != Some(&'[') {
        return None;
    }
    let content_start = i + 1;

    let mut j = content_start;
    while j < chars.len() {
        if chars[j] == ']' {
            let mut k = j + 1;
            let mut closing = 0;
            while chars.get(k) == Some(&'=') && closing < level {
                closing += 1;
                k += 1;
            }
            if closing == level && chars.get(k) == Some(&']') {
                let content: String = chars[content_start..j].iter().collect();
                return Some((content, k + 1));
            }
        }
        j += 1;
    }
    None
}
