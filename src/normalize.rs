//! Markdown-to-prose normalizer.
//!
//! Converts an LLM's markdown-formatted summary into flat, sentence-oriented
//! prose suitable for embedding in the diagram agent's prompt. Tables become
//! sentences, headers become trailing-colon labels, code fences become
//! one-line descriptions.
//!
//! Pure and total: never fails on malformed markdown, best-effort only.
//! Idempotent — running it over already-normalized text is a no-op modulo
//! whitespace.

/// Characters used in box-drawing / ASCII-art diagrams, stripped from prose.
const BOX_DRAWING: &[char] = &[
    '─', '│', '┌', '┐', '└', '┘', '├', '┤', '┬', '┴', '┼', '═', '║', '╔', '╗', '╚', '╝', '╠', '╣',
    '╦', '╩', '╬', '▶', '▲', '▼', '◀',
];

/// Normalize markdown into sentence-oriented prose.
pub fn normalize(markdown: &str) -> String {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        // Fenced code block: replace the whole block with a one-line description.
        if trimmed.starts_with("```") {
            let mut content = String::new();
            i += 1;
            while i < lines.len() && !lines[i].trim().starts_with("```") {
                content.push_str(lines[i]);
                content.push('\n');
                i += 1;
            }
            i += 1; // skip closing fence (or EOF)
            out.push(describe_code_block(&content));
            continue;
        }

        // Markdown table: header row, separator row, data rows.
        if looks_like_table_row(trimmed)
            && i + 1 < lines.len()
            && is_table_separator(lines[i + 1].trim())
        {
            let headers = split_table_row(trimmed);
            i += 2; // skip header + separator
            while i < lines.len() && looks_like_table_row(lines[i].trim()) {
                let cells = split_table_row(lines[i].trim());
                out.push(table_row_sentence(&headers, &cells));
                i += 1;
            }
            continue;
        }

        out.push(normalize_line(trimmed));
        i += 1;
    }

    collapse_whitespace(&out)
}

/// One-line description replacing a fenced code block.
fn describe_code_block(content: &str) -> String {
    let lower = content.to_lowercase();
    if lower.contains("flowchart")
        || lower.contains("graph ")
        || lower.contains("digraph")
        || lower.contains("-->")
    {
        return "The content describes a workflow pattern.".to_string();
    }
    if content.chars().any(|c| BOX_DRAWING.contains(&c)) {
        return "The content shows a structured layout.".to_string();
    }
    let flat =
        strip_inline_markup(&content.split_whitespace().collect::<Vec<_>>().join(" "));
    if flat.is_empty() {
        return String::new();
    }
    let snippet: String = flat.chars().take(100).collect();
    format!("Code example: {}.", snippet.trim_end_matches('.'))
}

fn looks_like_table_row(line: &str) -> bool {
    line.starts_with('|') && line.len() > 1
}

/// A separator row consists only of dashes, colons, pipes, and spaces,
/// with at least one dash.
fn is_table_separator(line: &str) -> bool {
    !line.is_empty()
        && line.contains('-')
        && line.chars().all(|c| matches!(c, '-' | ':' | '|' | ' '))
}

fn split_table_row(line: &str) -> Vec<String> {
    line.trim_matches('|')
        .split('|')
        .map(|c| strip_inline_markup(c.trim()))
        .collect()
}

/// Convert one table data row into a sentence.
///
/// Cell counts matching the header produce `"Header: Cell. Header: Cell."`;
/// mismatched rows fall back to joining non-empty cells.
fn table_row_sentence(headers: &[String], cells: &[String]) -> String {
    if headers.len() == cells.len() {
        let parts: Vec<String> = headers
            .iter()
            .zip(cells.iter())
            .filter(|(_, c)| !c.is_empty())
            .map(|(h, c)| format!("{}: {}.", h, c.trim_end_matches('.')))
            .collect();
        parts.join(" ")
    } else {
        let non_empty: Vec<&str> = cells
            .iter()
            .map(|c| c.as_str())
            .filter(|c| !c.is_empty())
            .collect();
        if non_empty.is_empty() {
            String::new()
        } else {
            format!("{}.", non_empty.join(". ").trim_end_matches('.'))
        }
    }
}

/// Normalize a single non-table, non-fence line.
fn normalize_line(trimmed: &str) -> String {
    if trimmed.is_empty() {
        return String::new();
    }

    // Horizontal rules vanish entirely.
    if is_horizontal_rule(trimmed) {
        return String::new();
    }

    // Orphan table separators (no header row above them) vanish too.
    if is_table_separator(trimmed) {
        return String::new();
    }

    // Headers become trailing-colon labels.
    if let Some(rest) = strip_header_marker(trimmed) {
        let label = strip_inline_markup(rest);
        if label.is_empty() {
            return String::new();
        }
        return format!("{}:", label.trim_end_matches(':'));
    }

    // Bullet and numbered list items become sentences.
    let body = strip_list_marker(trimmed);

    let mut text = strip_inline_markup(body);
    text.retain(|c| !BOX_DRAWING.contains(&c));
    let text = text.trim().to_string();
    if text.is_empty() {
        return String::new();
    }

    ensure_terminal_punctuation(text)
}

fn is_horizontal_rule(line: &str) -> bool {
    line.len() >= 3
        && (line.chars().all(|c| c == '-' || c == ' ')
            || line.chars().all(|c| c == '=' || c == ' ')
            || line.chars().all(|c| c == '*' || c == ' '))
        && line.chars().any(|c| c == '-' || c == '=' || c == '*')
}

/// Returns the header text if the line starts with 1-6 `#` characters.
fn strip_header_marker(line: &str) -> Option<&str> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if (1..=6).contains(&hashes) {
        let rest = &line[hashes..];
        if rest.starts_with(' ') || rest.is_empty() {
            return Some(rest.trim());
        }
    }
    None
}

/// Strip a leading bullet (`-`, `*`, `+`) or numbered (`1.`, `2)`) marker.
fn strip_list_marker(line: &str) -> &str {
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest.trim_start();
        }
    }
    // Numbered: digits followed by '.' or ')' then a space.
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return stripped.trim_start();
        }
    }
    line
}

/// Strip bold/italic/inline-code markers and link syntax, keeping inner text.
fn strip_inline_markup(text: &str) -> String {
    let mut s = text.replace("**", "").replace("__", "");
    s.retain(|c| c != '`' && c != '*');

    // [text](url) -> text
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '[' {
            let mut inner = String::new();
            let mut closed = false;
            for c2 in chars.by_ref() {
                if c2 == ']' {
                    closed = true;
                    break;
                }
                inner.push(c2);
            }
            if closed && chars.peek() == Some(&'(') {
                chars.next();
                for c2 in chars.by_ref() {
                    if c2 == ')' {
                        break;
                    }
                }
                out.push_str(&inner);
            } else {
                out.push('[');
                out.push_str(&inner);
                if closed {
                    out.push(']');
                }
            }
        } else {
            out.push(c);
        }
    }
    out.trim().to_string()
}

/// Append a period to lines lacking terminal punctuation. Lines ending with
/// a colon are labels and stay as-is.
fn ensure_terminal_punctuation(text: String) -> String {
    match text.chars().last() {
        Some('.') | Some('!') | Some('?') | Some(':') | Some(';') => text,
        _ => format!("{}.", text),
    }
}

/// Collapse 3+ consecutive blank lines to one and runs of spaces to a single
/// space.
fn collapse_whitespace(lines: &[String]) -> String {
    let mut out = String::new();
    let mut blank_run = 0;
    for line in lines {
        let squeezed = squeeze_spaces(line);
        if squeezed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            out.push('\n');
        } else {
            blank_run = 0;
            out.push_str(&squeezed);
            out.push('\n');
        }
    }
    out.trim_matches('\n').to_string()
}

fn squeeze_spaces(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_empty_output() {
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn headers_become_labels() {
        let got = normalize("# System Overview\n\nThe system has three tiers");
        assert!(got.contains("System Overview:"));
        assert!(got.contains("The system has three tiers."));
    }

    #[test]
    fn tables_become_sentences() {
        let md = "| Service | Role |\n|---------|------|\n| ALB | Ingress |\n| RDS | Storage |";
        let got = normalize(md);
        assert!(got.contains("Service: ALB. Role: Ingress."));
        assert!(got.contains("Service: RDS. Role: Storage."));
        assert!(!got.contains("|"));
        assert!(!got.contains("---"));
    }

    #[test]
    fn ragged_table_row_joins_cells() {
        let md = "| A | B |\n|---|---|\n| one | two | three |";
        let got = normalize(md);
        assert!(got.contains("one. two. three."));
    }

    #[test]
    fn code_fence_with_graph_keyword() {
        let md = "```\ndigraph G { a -> b }\n```";
        assert_eq!(normalize(md), "The content describes a workflow pattern.");
    }

    #[test]
    fn code_fence_with_box_drawing() {
        let md = "```\n┌───┐\n│ x │\n└───┘\n```";
        assert_eq!(normalize(md), "The content shows a structured layout.");
    }

    #[test]
    fn code_fence_plain_is_truncated() {
        let md = format!("```\n{}\n```", "x".repeat(300));
        let got = normalize(&md);
        assert!(got.starts_with("Code example: "));
        assert!(got.len() < 130);
        assert!(got.ends_with('.'));
    }

    #[test]
    fn emphasis_and_links_stripped() {
        let got = normalize("This uses **bold**, *italic*, `code`, and [a link](http://x.test)");
        assert_eq!(
            got,
            "This uses bold, italic, code, and a link."
        );
    }

    #[test]
    fn bullets_become_sentences() {
        let got = normalize("- first item\n* second item\n1. third item");
        assert!(got.contains("first item."));
        assert!(got.contains("second item."));
        assert!(got.contains("third item."));
        assert!(!got.contains("- "));
    }

    #[test]
    fn horizontal_rules_removed() {
        let got = normalize("before\n---\nafter\n===");
        assert!(got.contains("before."));
        assert!(got.contains("after."));
        assert!(!got.contains("---"));
        assert!(!got.contains("==="));
    }

    #[test]
    fn blank_lines_collapse() {
        let got = normalize("a\n\n\n\n\nb");
        assert_eq!(got, "a.\n\nb.");
    }

    #[test]
    fn space_runs_collapse() {
        assert_eq!(normalize("a    b"), "a b.");
    }

    #[test]
    fn no_unresolved_markers_for_arbitrary_input() {
        let nasty = "| x |\n|**|\n```\n| - |\n# ## ###\n**__**\n[](broken";
        let got = normalize(nasty);
        assert!(!got.contains("**"));
    }

    #[test]
    fn orphan_table_separator_is_dropped() {
        // A separator row with no header row above it must not survive.
        let got = normalize("|---|---|\ntext after");
        assert!(!got.contains('-'), "separator survived: {:?}", got);
        assert!(got.contains("text after."));

        assert_eq!(normalize("| :--- | ---: |"), "");
        assert_eq!(normalize("|---|"), "");
    }

    #[test]
    fn idempotent_on_normalized_text() {
        let md = "# Title\n\n| A | B |\n|---|---|\n| 1 | 2 |\n\n- item one\n\nSome **bold** text\n\n```\nflowchart TD\n```";
        let once = normalize(md);
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn plain_prose_passes_through() {
        let text = "First sentence. Second sentence.";
        assert_eq!(normalize(text), text);
    }
}
