//! Per-token metadata as returned by the attention backend.

use serde::{Deserialize, Serialize};

/// Reserved marker tokens that never carry linguistic metadata.
pub const SPECIAL_TOKENS: [&str; 2] = ["[CLS]", "[SEP]"];

/// Category label used for missing metadata and out-of-range lookups.
pub const NULL_CATEGORY: &str = "null";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TokenMeta {
    pub text: String,
    #[serde(default)]
    pub pos: Option<String>,
    #[serde(default)]
    pub dep: Option<String>,
    #[serde(default)]
    pub norm: Option<String>,
    #[serde(default)]
    pub is_ent: Option<bool>,
    /// Output embedding of the token at the requested layer.
    #[serde(default)]
    pub embeddings: Vec<f32>,
    /// Context (head-concatenated) vector at the requested layer.
    #[serde(default)]
    pub contexts: Vec<f32>,
}

impl TokenMeta {
    /// Sentinel record for special tokens and positions outside a sentence.
    pub fn null_filler(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn is_null(&self) -> bool {
        self.pos.is_none() && self.dep.is_none() && self.norm.is_none() && self.is_ent.is_none()
    }
}

/// Indexes of every token whose text matches one of `markers`.
pub fn special_indexes<S: AsRef<str>>(tokens: &[TokenMeta], markers: &[S]) -> Vec<usize> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| markers.iter().any(|m| m.as_ref() == t.text))
        .map(|(i, _)| i)
        .collect()
}

/// Drops tokens matching `markers` while keeping each survivor's original index.
pub fn strip_special<'a, S: AsRef<str>>(
    tokens: &'a [TokenMeta],
    markers: &[S],
) -> Vec<(usize, &'a TokenMeta)> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !markers.iter().any(|m| m.as_ref() == t.text))
        .collect()
}

pub fn texts(tokens: &[TokenMeta]) -> Vec<String> {
    tokens.iter().map(|t| t.text.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(text: &str) -> TokenMeta {
        TokenMeta {
            text: text.to_string(),
            pos: Some("NOUN".to_string()),
            ..TokenMeta::default()
        }
    }

    #[test]
    fn special_indexes_finds_boundary_markers() {
        let toks = vec![
            TokenMeta::null_filler("[CLS]"),
            tok("the"),
            tok("girl"),
            TokenMeta::null_filler("[SEP]"),
        ];
        assert_eq!(special_indexes(&toks, &SPECIAL_TOKENS), vec![0, 3]);
        assert_eq!(special_indexes::<&str>(&toks, &[]), Vec::<usize>::new());
    }

    #[test]
    fn strip_special_keeps_original_positions() {
        let toks = vec![
            TokenMeta::null_filler("[CLS]"),
            tok("ran"),
            tok("home"),
            TokenMeta::null_filler("[SEP]"),
        ];
        let kept: Vec<usize> = strip_special(&toks, &SPECIAL_TOKENS)
            .into_iter()
            .map(|(i, _)| i)
            .collect();
        assert_eq!(kept, vec![1, 2]);
        assert_eq!(strip_special::<&str>(&toks, &[]).len(), 4);
    }

    #[test]
    fn null_filler_has_no_metadata() {
        let t = TokenMeta::null_filler("[SEP]");
        assert!(t.is_null());
        assert!(!tok("x").is_null());
    }

    #[test]
    fn missing_fields_deserialize_as_none() {
        let t: TokenMeta = serde_json::from_str(r#"{"text":"[CLS]","pos":null}"#).unwrap();
        assert!(t.is_null());
        assert!(t.embeddings.is_empty());
    }
}
