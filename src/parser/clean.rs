//! Text normalization.
//!
//! Applied to plain-text extractions only; markdown output is preserved
//! as-is. When `[TABLE]` fences are present a gentler blank-line rule
//! keeps table spacing intact.

use super::extract::TABLE_OPEN;

const BLANK_RUN_LIMIT: usize = 2;
const BLANK_RUN_LIMIT_WITH_TABLES: usize = 3;

/// Normalizes extracted text.
///
/// Strips control characters (except `\n` and `\t`), collapses runs of
/// spaces, trims lines, collapses long blank runs, and drops lines made
/// of repeated structural punctuation.
pub fn normalize_text(text: &str) -> String {
    let preserve_tables = text.contains(TABLE_OPEN);
    let blank_limit = if preserve_tables {
        BLANK_RUN_LIMIT_WITH_TABLES
    } else {
        BLANK_RUN_LIMIT
    };

    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let cleaned = collapse_spaces(&strip_control_chars(line));
        let trimmed = cleaned.trim();

        if is_structural_noise(trimmed, preserve_tables) {
            continue;
        }
        lines.push(trimmed.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in &lines {
        if line.is_empty() {
            blank_run += 1;
            if blank_run > blank_limit {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    out.trim_matches('\n').to_string()
}

fn strip_control_chars(line: &str) -> String {
    line.chars()
        .filter(|c| !c.is_control() || *c == '\t')
        .collect()
}

fn collapse_spaces(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut last_was_space = false;
    for c in line.chars() {
        if c == ' ' {
            if !last_was_space {
                out.push(c);
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

fn is_structural_noise(line: &str, preserve_tables: bool) -> bool {
    if line.len() < 3 {
        return false;
    }
    // Pipe rows are table content, never noise in table mode.
    if preserve_tables && line.contains('|') {
        return false;
    }
    line.chars().all(|c| "-_=*~.•|+#".contains(c))
}
