use std::collections::VecDeque;
use std::sync::LazyLock;

use super::cleaner::clean_text;
use crate::config::ChunkingConfig;

static HEADING_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\n*#{2,6}\s+(?:\*{2})?(?:[A-Z]|\d+).+(?:\*{2})?").expect("heading regex is valid")
});

static NUMBERED_HEADING_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\n+[ \t]*(?:\*{2})?(\d+(?:\.\d+)*)(?:\*{2})?[ \t]+(?:\*{2})?([A-Z]).+")
        .expect("numbered heading regex is valid")
});

static PAGE_BREAK_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\n*-----").expect("page break regex is valid"));

static TABLE_CAPTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\n*Table\s*\d+:\s*[A-Z].+").expect("table caption regex is valid")
});

static SECTION_GAP_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\n{3,}").expect("section gap regex is valid"));

static PARAGRAPH_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\n\n").expect("paragraph regex is valid"));

static LINE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\n").expect("line regex is valid"));

static SPACE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r" ").expect("space regex is valid"));

/// Split boundaries, coarsest first. Each split keeps the separator at the
/// start of the following piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Separator {
    Heading,
    NumberedHeading,
    PageBreak,
    TableCaption,
    SectionGap,
    Paragraph,
    Line,
    Space,
}

const SEPARATORS: [Separator; 8] = [
    Separator::Heading,
    Separator::NumberedHeading,
    Separator::PageBreak,
    Separator::TableCaption,
    Separator::SectionGap,
    Separator::Paragraph,
    Separator::Line,
    Separator::Space,
];

impl Separator {
    fn regex(self) -> &'static regex::Regex {
        match self {
            Self::Heading => &HEADING_RE,
            Self::NumberedHeading => &NUMBERED_HEADING_RE,
            Self::PageBreak => &PAGE_BREAK_RE,
            Self::TableCaption => &TABLE_CAPTION_RE,
            Self::SectionGap => &SECTION_GAP_RE,
            Self::Paragraph => &PARAGRAPH_RE,
            Self::Line => &LINE_RE,
            Self::Space => &SPACE_RE,
        }
    }

    /// Byte offsets where this separator starts a new piece.
    fn boundaries(self, text: &str) -> Vec<usize> {
        if self == Self::NumberedHeading {
            // "12 Kb"-style quantities are not headings
            return NUMBERED_HEADING_RE
                .captures_iter(text)
                .filter(|caps| !caps.get(2).is_some_and(|m| m.as_str() == "K"))
                .filter_map(|caps| caps.get(0).map(|m| m.start()))
                .collect();
        }
        self.regex().find_iter(text).map(|m| m.start()).collect()
    }

    fn split(self, text: &str) -> Vec<&str> {
        let mut pieces = Vec::new();
        let mut start = 0;
        for boundary in self.boundaries(text) {
            if boundary > start {
                pieces.push(&text[start..boundary]);
                start = boundary;
            }
        }
        pieces.push(&text[start..]);
        pieces.retain(|p| !p.is_empty());
        pieces
    }
}

/// Recursive separator chunker: split on the coarsest boundary present,
/// merge small pieces up to `chunk_size` characters with `chunk_overlap`,
/// and recurse into pieces that are still too large.
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_size: usize,
}

impl RecursiveChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize, min_chunk_size: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            min_chunk_size,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap, config.min_chunk_size)
    }

    /// Cleaned chunks in document order. Chunks no longer than
    /// `min_chunk_size` characters are dropped.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        self.split(text, &SEPARATORS)
            .into_iter()
            .filter(|chunk| char_len(chunk) > self.min_chunk_size)
            .map(|chunk| clean_text(&chunk))
            .collect()
    }

    fn split(&self, text: &str, separators: &[Separator]) -> Vec<String> {
        let Some(last) = separators.len().checked_sub(1) else {
            return vec![text.to_string()];
        };
        let index = separators
            .iter()
            .position(|sep| sep.regex().is_match(text))
            .unwrap_or(last);
        let separator = separators[index];
        let remaining = &separators[index + 1..];

        let mut chunks = Vec::new();
        let mut small: Vec<&str> = Vec::new();
        for piece in separator.split(text) {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                chunks.extend(self.merge(&small));
                small.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece.trim().to_string());
            } else {
                chunks.extend(self.split(piece, remaining));
            }
        }
        if !small.is_empty() {
            chunks.extend(self.merge(&small));
        }
        chunks
    }

    /// Greedily pack pieces into chunks, carrying up to `chunk_overlap`
    /// characters of trailing pieces into the next chunk.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }
        push_joined(&mut chunks, &window);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
