//! Reply chunking for synthesis
//!
//! Splits reply text into speakable segments no longer than a character
//! bound, preferring sentence boundaries and never breaking inside a word.

/// Sentence terminators recognised at a boundary
const TERMINATORS: [char; 3] = ['.', '!', '?'];

#[derive(Debug, Clone, Copy)]
pub struct ResponseChunker {
    max_len: usize,
}

impl ResponseChunker {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(1),
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Split `text` into ordered chunks.
    ///
    /// Sentences are packed greedily up to `max_len` characters; a sentence
    /// longer than the bound becomes its own chunk. Text with no sentence
    /// boundary is packed word by word instead. Empty for blank input.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        match split_sentences(text) {
            Some(sentences) => pack(sentences, self.max_len),
            None => pack(
                text.split_whitespace().map(str::to_string).collect(),
                self.max_len,
            ),
        }
    }
}

/// Sentences ending at a terminator followed by whitespace. `None` when the
/// text has no such boundary. A trailing fragment without a terminator gets
/// a period.
fn split_sentences(text: &str) -> Option<Vec<String>> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut found_boundary = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let at_boundary =
            TERMINATORS.contains(&c) && chars.peek().map_or(false, |next| next.is_whitespace());
        if at_boundary {
            found_boundary = true;
            push_sentence(&mut sentences, &current);
            current.clear();
        }
    }
    push_sentence(&mut sentences, &current);

    if !found_boundary {
        return None;
    }

    for sentence in &mut sentences {
        if !sentence.ends_with(TERMINATORS) {
            sentence.push('.');
        }
    }
    Some(sentences)
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

/// Greedy packing joined by single spaces
fn pack(pieces: Vec<String>, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for piece in pieces {
        let piece_len = piece.chars().count();
        if current.is_empty() {
            current = piece;
            current_len = piece_len;
        } else if current_len + 1 + piece_len <= max_len {
            current.push(' ');
            current.push_str(&piece);
            current_len += 1 + piece_len;
        } else {
            chunks.push(std::mem::replace(&mut current, piece));
            current_len = piece_len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
