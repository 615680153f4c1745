//! Character-window chunking with overlap and sentence-boundary pullback.

use crate::config::ChunkingSettings;
use crate::error::{Error, Result};
use crate::types::Chunk;

/// Byte range into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(Error::InvalidConfig(format!(
                "invalid chunking parameters: size={} overlap={}",
                chunk_size, chunk_overlap
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self> {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    /// Splits `text` into windows of at most `chunk_size` characters.
    ///
    /// The first span starts at 0, the last ends at `text.len()`, each span
    /// starts strictly after the previous one and overlaps it by at most
    /// `chunk_overlap` characters.
    pub fn split(&self, text: &str) -> Result<Vec<Span>> {
        if text.trim().is_empty() {
            return Err(Error::Conversion("document text is empty".into()));
        }

        let chars: Vec<char> = text.chars().collect();
        // byte offset of every char position, plus the end
        let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        offsets.push(text.len());
        let n = chars.len();

        let mut spans = Vec::new();
        let mut start = 0usize;
        loop {
            let mut end = (start + self.chunk_size).min(n);
            if end < n {
                if let Some(b) = last_boundary(&chars[start..end]) {
                    let b = start + b;
                    if b > start + self.chunk_size / 2 {
                        end = b + 1;
                    }
                }
            }
            spans.push(Span { start: offsets[start], end: offsets[end] });
            if end >= n {
                break;
            }
            start = end.saturating_sub(self.chunk_overlap).max(start + 1);
        }
        Ok(spans)
    }

    /// Splits a document into ordered chunks (without embeddings).
    pub fn chunk(&self, document_id: &str, text: &str) -> Result<Vec<Chunk>> {
        let spans = self.split(text)?;
        tracing::debug!(document_id, chunks = spans.len(), "split document");
        Ok(spans
            .into_iter()
            .enumerate()
            .map(|(ordinal, span)| Chunk {
                id: Chunk::make_id(document_id, ordinal),
                document_id: document_id.to_string(),
                ordinal,
                start: span.start,
                end: span.end,
                text: text[span.start..span.end].to_string(),
                embedding: Vec::new(),
            })
            .collect())
    }
}

/// Index of the last sentence terminator in `window`: `.`, `?` or `!` followed
/// by a space, or a newline.
fn last_boundary(window: &[char]) -> Option<usize> {
    (0..window.len()).rev().find(|&i| match window[i] {
        '\n' => true,
        '.' | '?' | '!' => window.get(i + 1) == Some(&' '),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reassemble(text: &str, spans: &[Span]) -> String {
        let mut out = String::new();
        let mut covered = 0;
        for s in spans {
            if s.end > covered {
                out.push_str(&text[covered.max(s.start)..s.end]);
                covered = s.end;
            }
        }
        out
    }

    #[test]
    fn short_text_is_one_chunk() {
        let c = Chunker::new(100, 10).unwrap();
        let spans = c.split("Short text.").unwrap();
        assert_eq!(spans, vec![Span { start: 0, end: 11 }]);
    }

    #[test]
    fn empty_text_is_conversion_error() {
        let c = Chunker::new(100, 10).unwrap();
        assert!(matches!(c.split("  \n\t "), Err(Error::Conversion(_))));
    }

    #[test]
    fn pulls_back_to_sentence_boundary() {
        let c = Chunker::new(30, 5).unwrap();
        let text = "The first sentence is here. And the second one keeps going on.";
        let spans = c.split(text).unwrap();
        assert_eq!(&text[spans[0].start..spans[0].end], "The first sentence is here.");
    }

    #[test]
    fn spans_cover_text_without_gaps() {
        let c = Chunker::new(50, 10).unwrap();
        let text = "Lorem ipsum dolor sit amet. ".repeat(20);
        let spans = c.split(&text).unwrap();
        assert!(spans.len() > 1);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans.last().unwrap().end, text.len());
        for pair in spans.windows(2) {
            assert!(pair[1].start > pair[0].start);
            assert!(pair[1].start <= pair[0].end, "gap between chunks");
            assert!(pair[0].end - pair[1].start <= 10, "overlap too large");
        }
        assert_eq!(reassemble(&text, &spans), text);
    }

    #[test]
    fn never_splits_multibyte_chars() {
        let c = Chunker::new(7, 2).unwrap();
        let text = "héllo wörld ünïcode ßtrings àgain";
        let chunks = c.chunk("doc", text).unwrap();
        for ch in &chunks {
            assert!(ch.text.chars().count() <= 7);
        }
        assert_eq!(chunks[1].id, "doc:1");
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(Chunker::new(10, 10).is_err());
        assert!(Chunker::new(0, 0).is_err());
    }
}
