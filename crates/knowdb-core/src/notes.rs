//! Offline title and tag derivation for free-text notes.

use std::collections::HashMap;

pub const UNTITLED: &str = "Untitled Note";
const MAX_TITLE_WORDS: usize = 6;
const MAX_TAGS: usize = 5;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "were", "will", "with",
];

const INTRO_PHRASES: &[&str] = &["today i learned", "i learned", "note about", "today's note"];

/// Splits on `.`/`!`/`?` followed by whitespace and an uppercase letter.
fn first_sentence(text: &str) -> Option<&str> {
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let rest = &text[i + c.len_utf8()..];
            let trimmed = rest.trim_start();
            if trimmed.len() < rest.len() && trimmed.starts_with(|ch: char| ch.is_uppercase()) {
                let s = text[..i + c.len_utf8()].trim();
                if !s.is_empty() {
                    return Some(s);
                }
            }
        }
    }
    let s = text.trim();
    (!s.is_empty()).then_some(s)
}

fn tokenize_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

fn is_stop_word(w: &str) -> bool {
    STOP_WORDS.contains(&w)
}

fn title_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut upper_next = true;
    for c in word.chars() {
        if upper_next {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        upper_next = !c.is_alphabetic();
    }
    out
}

pub fn derive_title(content: &str) -> String {
    let Some(sentence) = first_sentence(content) else {
        return UNTITLED.to_string();
    };
    let mut cleaned = sentence.to_lowercase();
    for phrase in INTRO_PHRASES {
        cleaned = cleaned.replace(phrase, "").trim().to_string();
    }
    let words: Vec<String> = tokenize_words(&cleaned)
        .into_iter()
        .filter(|w| !is_stop_word(w))
        .take(MAX_TITLE_WORDS)
        .map(|w| title_case(&w))
        .collect();
    if words.is_empty() {
        UNTITLED.to_string()
    } else {
        words.join(" ")
    }
}

/// Most frequent words longer than three characters, ties in first-seen order.
pub fn derive_tags(content: &str) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (pos, w) in tokenize_words(content).into_iter().enumerate() {
        if is_stop_word(&w) || w.chars().count() <= 3 {
            continue;
        }
        counts.entry(w).or_insert((0, pos)).0 += 1;
    }
    let mut ranked: Vec<(String, usize, usize)> =
        counts.into_iter().map(|(w, (n, first))| (w, n, first)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(MAX_TAGS)
        .map(|(w, _, _)| format!("#{}", title_case(&w)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_strips_intro_and_stop_words() {
        let t = derive_title("Today I learned that the borrow checker is strict. More later.");
        assert_eq!(t, "Borrow Checker Strict");
    }

    #[test]
    fn title_is_capped_at_six_words() {
        let t = derive_title("one two three four five six seven eight");
        assert_eq!(t, "One Two Three Four Five Six");
    }

    #[test]
    fn blank_content_is_untitled() {
        assert_eq!(derive_title("   "), UNTITLED);
        assert_eq!(derive_title("the of and."), UNTITLED);
    }

    #[test]
    fn tags_rank_by_frequency_then_order() {
        let tags = derive_tags("rust tokio rust async tokio rust lance tantivy arrow");
        assert_eq!(tags, vec!["#Rust", "#Tokio", "#Async", "#Lance", "#Tantivy"]);
    }
}
