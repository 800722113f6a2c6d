const BOX_WIDTH: usize = 72; // Total width including borders
const CONTENT_WIDTH: usize = BOX_WIDTH - 6; // Width for content (excluding "║  " and "  ║")

/// Draws a box around the given lines. Empty strings become blank rows;
/// lines wider than the box are wrapped on whitespace.
pub fn boxed(lines: &[&str]) -> String {
    let mut out = format!("╔{}╗\n", "═".repeat(BOX_WIDTH - 2));

    for line in lines {
        if line.is_empty() {
            out.push_str(&format!("║{}║\n", " ".repeat(BOX_WIDTH - 2)));
            continue;
        }
        for row in wrap(line, CONTENT_WIDTH) {
            let padding = CONTENT_WIDTH.saturating_sub(visible_len(&row));
            out.push_str(&format!("║  {}{}  ║\n", row, " ".repeat(padding)));
        }
    }

    out.push_str(&format!("╚{}╝\n", "═".repeat(BOX_WIDTH - 2)));
    out
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut rows = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            visible_len(word)
        } else {
            visible_len(&current) + 1 + visible_len(word)
        };
        if needed > width && !current.is_empty() {
            rows.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        rows.push(current);
    }
    rows
}

/// Visible length in characters, ignoring ANSI escape sequences.
fn visible_len(text: &str) -> usize {
    let mut len = 0;
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            // Skip escape sequence
            if chars.next() == Some('[') {
                for c in chars.by_ref() {
                    if c.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
        } else {
            len += 1;
        }
    }

    len
}
