/// Normalises text before it is sent to an embedding model: collapses runs of
/// whitespace and truncates to `max_chars` characters. Case is kept.
pub fn prepare_for_embedding(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(max_chars) {
        Some((cut, _)) => collapsed[..cut].to_string(),
        None => collapsed,
    }
}

/// Vector used for input with nothing to embed, kept unit length so cosine
/// stays defined.
pub fn blank_vector(dim: usize) -> Vec<f32> {
    let mut v = vec![0f32; dim];
    if let Some(first) = v.first_mut() {
        *first = 1.0;
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_and_truncates() {
        assert_eq!(prepare_for_embedding("  Hello \n\n  World\t!", 100), "Hello World !");
        assert_eq!(prepare_for_embedding("ÄÖÜ abc", 3), "ÄÖÜ");
        assert_eq!(prepare_for_embedding(" \n\t ", 100), "");
    }

    #[test]
    fn blank_vector_is_unit_length() {
        assert_eq!(blank_vector(3), vec![1.0, 0.0, 0.0]);
        assert!(blank_vector(0).is_empty());
    }
}
