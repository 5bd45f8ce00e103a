//! Word-count text chunking.

use crate::engine::pool::{Provenance, VariablePool};
use sk_protocol::sequence_models::ChunkingSettings;
use sk_protocol::variable_models::{VariableType, VariableValue};
use tracing::debug;

/// Suffix of the list a chunked scalar is exposed under.
pub const CHUNKS_SUFFIX: &str = "_chunks";

pub fn chunks_name(source: &str) -> String {
    format!("{source}{CHUNKS_SUFFIX}")
}

/// Split `text` into chunks of `chunk_size` words.
///
/// With `preserve_sentences`, a full chunk keeps growing until a word that
/// ends a sentence. Whitespace inside a chunk is normalized to single spaces.
pub fn chunk_text(text: &str, settings: &ChunkingSettings) -> Vec<String> {
    let size = settings.chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::with_capacity(size);

    for word in text.split_whitespace() {
        current.push(word);
        if current.len() >= size && (!settings.preserve_sentences || ends_sentence(word)) {
            chunks.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    chunks
}

fn ends_sentence(word: &str) -> bool {
    let trimmed = word.trim_end_matches(['"', '\'', ')', ']', '\u{201d}', '\u{2019}']);
    trimmed.ends_with(['.', '!', '?'])
}

/// Bind `<name>_chunks` for every scalar input and override in the pool.
///
/// Names already taken are left alone. Returns the names bound.
pub fn expose_chunks(pool: &mut VariablePool, settings: &ChunkingSettings) -> Vec<String> {
    let sources: Vec<(String, String)> = pool
        .iter()
        .filter(|(_, entry)| {
            matches!(
                entry.provenance,
                Provenance::Override
                    | Provenance::SequenceVariable {
                        var_type: VariableType::Input
                    }
            )
        })
        .filter_map(|(name, entry)| {
            entry
                .value
                .as_scalar()
                .map(|text| (name.clone(), text.to_string()))
        })
        .collect();

    let mut exposed = Vec::new();
    for (source, text) in sources {
        let name = chunks_name(&source);
        let chunks = chunk_text(&text, settings);
        let count = chunks.len();
        match pool.bind(
            name.clone(),
            VariableValue::List(chunks),
            Provenance::Chunked {
                source: source.clone(),
            },
        ) {
            Ok(()) => {
                debug!(variable = %source, chunks = count, "exposed chunked input");
                exposed.push(name);
            }
            Err(error) => debug!(variable = %source, %error, "chunk list name already taken"),
        }
    }
    exposed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn settings(chunk_size: usize, preserve_sentences: bool) -> ChunkingSettings {
        ChunkingSettings {
            chunk_size,
            preserve_sentences,
            loop_enabled: false,
        }
    }

    #[test]
    fn test_splits_on_word_count() {
        let chunks = chunk_text("one two three four five", &settings(2, false));
        assert_eq!(chunks, vec!["one two", "three four", "five"]);
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(chunk_text("  just\n a line ", &settings(10, true)), vec!["just a line"]);
        assert!(chunk_text("   ", &settings(10, true)).is_empty());
    }

    #[test]
    fn test_preserve_sentences_extends_to_sentence_end() {
        let text = "The cat sat on the mat. It slept (soundly.) Then it woke!";
        let chunks = chunk_text(text, &settings(3, true));
        assert_eq!(
            chunks,
            vec!["The cat sat on the mat.", "It slept (soundly.)", "Then it woke!"]
        );
    }

    #[test]
    fn test_expose_chunks_for_scalar_overrides_only() {
        let mut overrides = BTreeMap::new();
        overrides.insert("doc".to_string(), VariableValue::from("a b c"));
        overrides.insert("tags".to_string(), VariableValue::List(vec!["x".into()]));
        let mut pool = VariablePool::seeded(&[], &[], &overrides);

        let exposed = expose_chunks(&mut pool, &settings(2, false));

        assert_eq!(exposed, vec!["doc_chunks"]);
        assert_eq!(
            pool.get("doc_chunks"),
            Some(&VariableValue::List(vec!["a b".into(), "c".into()]))
        );
        assert!(!pool.contains("tags_chunks"));
    }

    #[test]
    fn test_expose_chunks_keeps_existing_name() {
        let mut overrides = BTreeMap::new();
        overrides.insert("doc".to_string(), VariableValue::from("a b c"));
        overrides.insert("doc_chunks".to_string(), VariableValue::from("mine"));
        let mut pool = VariablePool::seeded(&[], &[], &overrides);

        let exposed = expose_chunks(&mut pool, &settings(2, false));

        assert_eq!(exposed, vec!["doc_chunks_chunks"]);
        assert_eq!(pool.get("doc_chunks"), Some(&VariableValue::from("mine")));
    }
}
