/// Splits a reply into chunks of at most `max_chars` characters, breaking on
/// line boundaries where possible. Lines longer than the budget are hard-split.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for line in text.split('\n') {
        for piece in hard_split(line, max_chars) {
            let piece_len = piece.chars().count();
            if current_len + piece_len + 1 > max_chars && current_len > 0 {
                push_chunk(&mut chunks, &current);
                current.clear();
                current_len = 0;
            }
            current.push_str(piece);
            current.push('\n');
            current_len += piece_len + 1;
        }
    }
    push_chunk(&mut chunks, &current);
    chunks
}

fn push_chunk(chunks: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn hard_split(line: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut count = 0usize;
    for (idx, _) in line.char_indices() {
        if count == max_chars {
            pieces.push(&line[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    pieces.push(&line[start..]);
    pieces
}

/// Last `n` lines of `text` after trimming surrounding whitespace.
pub fn last_lines(text: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.trim().split('\n').collect();
    let skip = lines.len().saturating_sub(n);
    lines.into_iter().skip(skip).collect()
}

pub fn or_none(value: &str) -> &str {
    if value.trim().is_empty() {
        "none"
    } else {
        value
    }
}
