//! Client for the language-segmentation service.
//!
//! The service splits a stored document into sentences and tags each one with
//! the languages it was detected in. [`join_by_language`] folds that back into
//! one text blob per language.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use crate::config::SegmenterConfig;
use crate::error::SegmentError;

/// One sentence of a document and the languages detected in it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "(String, Vec<String>)")]
pub struct Sentence {
    pub text: String,
    pub languages: Vec<String>,
}

impl From<(String, Vec<String>)> for Sentence {
    fn from((text, languages): (String, Vec<String>)) -> Self {
        Self { text, languages }
    }
}

impl Sentence {
    pub fn new(text: impl Into<String>, languages: &[&str]) -> Self {
        Self {
            text: text.into(),
            languages: languages.iter().map(|l| l.to_string()).collect(),
        }
    }
}

#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Fetch the ordered sentences of `doc_id`, optionally restricted to one language.
    async fn segment(
        &self,
        doc_id: &str,
        language: Option<&str>,
    ) -> Result<Vec<Sentence>, SegmentError>;
}

#[derive(Debug, Deserialize)]
struct SegmentResponse {
    text: Vec<Sentence>,
}

/// HTTP binding: `GET {url}?id=<doc>[&filter=<lang>]`.
#[derive(Clone)]
pub struct HttpSegmenter {
    client: reqwest::Client,
    url: String,
}

impl HttpSegmenter {
    pub fn new(config: &SegmenterConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(
            config.url.starts_with("http://") || config.url.starts_with("https://"),
            "segmenter url must be an http(s) URL, got '{}'",
            config.url
        );
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    fn request_url(&self, doc_id: &str, language: Option<&str>) -> Result<Url, SegmentError> {
        let mut params = vec![("id", doc_id)];
        if let Some(lang) = language {
            params.push(("filter", lang));
        }
        Url::parse_with_params(&self.url, &params).map_err(|e| SegmentError::Decode {
            doc_id: doc_id.to_string(),
            reason: format!("invalid segmenter url: {e}"),
        })
    }
}

#[async_trait]
impl Segmenter for HttpSegmenter {
    async fn segment(
        &self,
        doc_id: &str,
        language: Option<&str>,
    ) -> Result<Vec<Sentence>, SegmentError> {
        let url = self.request_url(doc_id, language)?;
        let transport = |source: reqwest::Error| SegmentError::Transport {
            doc_id: doc_id.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(SegmentError::Status {
                doc_id: doc_id.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SegmentResponse = response.json().await.map_err(|e| SegmentError::Decode {
            doc_id: doc_id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(parsed.text)
    }
}

/// Concatenate, per language, every sentence tagged with that language.
///
/// Languages outside `languages` are ignored; a sentence tagged with several
/// supported languages contributes to each of them. Languages without any
/// sentence are absent from the result.
pub fn join_by_language(sentences: &[Sentence], languages: &[String]) -> BTreeMap<String, String> {
    let mut texts: BTreeMap<String, String> = BTreeMap::new();
    for sentence in sentences {
        for lang in &sentence.languages {
            if !languages.contains(lang) {
                continue;
            }
            let text = texts.entry(lang.clone()).or_default();
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&sentence.text);
        }
    }
    texts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn langs(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn response_decodes_sentence_tuples() {
        let json = r#"{"text": [["Hola mundo.", ["es"]], ["Hello there.", ["en", "es"]]]}"#;
        let parsed: SegmentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed.text,
            vec![
                Sentence::new("Hola mundo.", &["es"]),
                Sentence::new("Hello there.", &["en", "es"]),
            ]
        );
    }

    #[test]
    fn joins_sentences_per_supported_language() {
        let sentences = vec![
            Sentence::new("Hola mundo.", &["es"]),
            Sentence::new("Hello world.", &["en"]),
            Sentence::new("Hallo Welt.", &["de"]),
            Sentence::new("OK.", &["en", "es"]),
        ];
        let texts = join_by_language(&sentences, &langs(&["en", "es"]));

        assert_eq!(texts.len(), 2);
        assert_eq!(texts["es"], "Hola mundo. OK.");
        assert_eq!(texts["en"], "Hello world. OK.");
    }

    #[test]
    fn languages_without_sentences_are_absent() {
        let sentences = vec![Sentence::new("Hello.", &["en"])];
        let texts = join_by_language(&sentences, &langs(&["en", "es"]));
        assert!(texts.contains_key("en"));
        assert!(!texts.contains_key("es"));
    }

    #[test]
    fn request_url_carries_id_and_filter() {
        let segmenter = HttpSegmenter::new(&SegmenterConfig {
            url: "http://segmenter.local/detect".into(),
            timeout_secs: 5,
        })
        .unwrap();
        let url = segmenter.request_url("post-1", Some("es")).unwrap();
        assert_eq!(url.as_str(), "http://segmenter.local/detect?id=post-1&filter=es");
    }

    #[test]
    fn rejects_non_http_url() {
        let result = HttpSegmenter::new(&SegmenterConfig {
            url: "segmenter.local".into(),
            timeout_secs: 5,
        });
        assert!(result.is_err());
    }
}
