//! Per-language tokenization.
//!
//! The [`Tokenizer`] trait is the seam to whatever language-specific tokenizer
//! a deployment uses; [`WordTokenizer`] is the built-in rule-based one.

use std::collections::HashMap;
use std::sync::Arc;

use tokenizers::pre_tokenizers::whitespace::Whitespace;
use tokenizers::{NormalizedString, OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer};

use crate::error::TokenizeError;

/// Splits raw text into an ordered sequence of token strings.
///
/// Implementations are synchronous; callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<Vec<String>, TokenizeError>;
}

/// Word tokenizer over the `tokenizers` whitespace pre-tokenizer: runs of word
/// characters form one token, runs of other non-whitespace characters form
/// another. Word-internal `'` and `-` are glued back so that `don't` and
/// `state-of-the-art` stay whole.
#[derive(Debug, Clone)]
pub struct WordTokenizer {
    lowercase: bool,
}

impl WordTokenizer {
    pub fn new(lowercase: bool) -> Self {
        Self { lowercase }
    }
}

fn is_word(piece: &str) -> bool {
    piece
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
}

fn is_joiner(piece: &str) -> bool {
    piece == "'" || piece == "-"
}

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<String>, TokenizeError> {
        let mut normalized = NormalizedString::from(text);
        if self.lowercase {
            normalized.lowercase();
        }
        let mut pretokenized = PreTokenizedString::from(normalized);
        Whitespace::default()
            .pre_tokenize(&mut pretokenized)
            .map_err(|e| TokenizeError::PreTokenize(e.to_string()))?;

        let pieces: Vec<(&str, usize, usize)> = pretokenized
            .get_splits(OffsetReferential::Normalized, OffsetType::Byte)
            .into_iter()
            .map(|(piece, (start, end), _)| (piece, start, end))
            .collect();

        let mut tokens: Vec<String> = Vec::with_capacity(pieces.len());
        // end offset of the last token while it is a word
        let mut word_end: Option<usize> = None;
        let mut i = 0;
        while i < pieces.len() {
            let (piece, start, end) = pieces[i];
            if is_joiner(piece) && word_end == Some(start) {
                if let Some(&(next, next_start, next_end)) = pieces.get(i + 1) {
                    if next_start == end && is_word(next) {
                        if let Some(last) = tokens.last_mut() {
                            last.push_str(piece);
                            last.push_str(next);
                        }
                        word_end = Some(next_end);
                        i += 2;
                        continue;
                    }
                }
            }
            tokens.push(piece.to_string());
            word_end = is_word(piece).then_some(end);
            i += 1;
        }
        Ok(tokens)
    }
}

/// Tokenizers keyed by language code.
#[derive(Clone, Default)]
pub struct TokenizerSet {
    tokenizers: HashMap<String, Arc<dyn Tokenizer>>,
}

impl TokenizerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`WordTokenizer`] per language.
    pub fn word_tokenizers(languages: &[String], lowercase: bool) -> Self {
        let mut set = Self::new();
        for lang in languages {
            set.insert(lang.clone(), Arc::new(WordTokenizer::new(lowercase)));
        }
        set
    }

    pub fn insert(&mut self, lang: impl Into<String>, tokenizer: Arc<dyn Tokenizer>) {
        self.tokenizers.insert(lang.into(), tokenizer);
    }

    pub fn tokenize(&self, lang: &str, text: &str) -> Result<Vec<String>, TokenizeError> {
        let tokenizer = self
            .tokenizers
            .get(lang)
            .ok_or_else(|| TokenizeError::UnsupportedLanguage(lang.to_string()))?;
        tokenizer.tokenize(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<String> {
        WordTokenizer::new(true).tokenize(text).unwrap()
    }

    #[test]
    fn splits_words_and_punctuation() {
        assert_eq!(
            tokens("La casa, es grande!"),
            vec!["la", "casa", ",", "es", "grande", "!"]
        );
    }

    #[test]
    fn keeps_word_internal_apostrophes_and_hyphens() {
        assert_eq!(
            tokens("Don't use state-of-the-art - ever"),
            vec!["don't", "use", "state-of-the-art", "-", "ever"]
        );
    }

    #[test]
    fn handles_non_ascii_letters() {
        assert_eq!(tokens("Niño  pequeño\tcomió"), vec!["niño", "pequeño", "comió"]);
    }

    #[test]
    fn preserves_case_when_configured() {
        let t = WordTokenizer::new(false).tokenize("Casa Blanca").unwrap();
        assert_eq!(t, vec!["Casa", "Blanca"]);
    }

    #[test]
    fn punctuation_runs_stay_together() {
        assert_eq!(tokens("¿Qué?! rock'n'roll"), vec!["¿", "qué", "?!", "rock'n'roll"]);
    }

    #[test]
    fn detached_joiners_are_tokens() {
        assert_eq!(tokens("casa- grande 'sol"), vec!["casa", "-", "grande", "'", "sol"]);
    }

    #[test]
    fn empty_text_yields_no_tokens() {
        assert!(tokens("   \n ").is_empty());
    }

    #[test]
    fn unknown_language_fails_fast() {
        let set = TokenizerSet::word_tokenizers(&["en".to_string()], true);
        assert!(set.tokenize("en", "hello").is_ok());
        assert!(matches!(
            set.tokenize("de", "hallo"),
            Err(TokenizeError::UnsupportedLanguage(lang)) if lang == "de"
        ));
    }
}
