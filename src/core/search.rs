//! Categorical summaries of nearest-neighbor search results.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::tokens::{TokenMeta, NULL_CATEGORY};

/// Token metadata a histogram can be bucketed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MetaField {
    #[default]
    #[serde(rename = "pos")]
    Pos,
    #[serde(rename = "dep")]
    Dep,
    #[serde(rename = "is_ent")]
    IsEnt,
    #[serde(rename = "norm")]
    Norm,
}

impl MetaField {
    pub fn as_str(self) -> &'static str {
        match self {
            MetaField::Pos => "pos",
            MetaField::Dep => "dep",
            MetaField::IsEnt => "is_ent",
            MetaField::Norm => "norm",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pos" => Some(MetaField::Pos),
            "dep" => Some(MetaField::Dep),
            "is_ent" => Some(MetaField::IsEnt),
            "norm" => Some(MetaField::Norm),
            _ => None,
        }
    }

    pub fn all() -> &'static [MetaField] {
        &[MetaField::Pos, MetaField::Dep, MetaField::IsEnt, MetaField::Norm]
    }

    /// Category of `token` under this field; missing values map to `"null"`.
    pub fn category(self, token: &TokenMeta) -> String {
        let v = match self {
            MetaField::Pos => token.pos.clone(),
            MetaField::Dep => token.dep.clone(),
            MetaField::Norm => token.norm.clone(),
            MetaField::IsEnt => token.is_ent.map(|e| e.to_string()),
        };
        v.unwrap_or_else(|| NULL_CATEGORY.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub sentence: String,
    /// Position of the matched token inside `tokens`.
    pub index: usize,
    pub tokens: Vec<TokenMeta>,
    /// Attention the matched token pays to each token of its sentence.
    #[serde(default)]
    pub matched_att: Vec<f32>,
}

impl SearchHit {
    /// Position of the first maximum of `matched_att`, if any.
    pub fn max_att_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, v) in self.matched_att.iter().enumerate() {
            if !v.is_finite() {
                continue;
            }
            match best {
                Some((_, b)) if *v <= b => {}
                _ => best = Some((i, *v)),
            }
        }
        best.map(|(i, _)| i)
    }

    /// Token `offset` positions from the match, or the null sentinel past either end.
    pub fn token_at_offset(&self, offset: i32) -> TokenMeta {
        let pos = self.index as i64 + offset as i64;
        usize::try_from(pos)
            .ok()
            .and_then(|p| self.tokens.get(p))
            .cloned()
            .unwrap_or_else(|| TokenMeta::null_filler(NULL_CATEGORY))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Histogram {
    counts: HashMap<String, u32>,
}

impl Histogram {
    pub fn add(&mut self, category: impl Into<String>) {
        *self.counts.entry(category.into()).or_insert(0) += 1;
    }

    pub fn get(&self, category: &str) -> u32 {
        self.counts.get(category).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Count descending, label ascending.
    pub fn sorted(&self) -> Vec<(String, u32)> {
        let mut out: Vec<(String, u32)> =
            self.counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }
}

impl<S: Into<String>> FromIterator<S> for Histogram {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut h = Histogram::default();
        for c in iter {
            h.add(c);
        }
        h
    }
}

/// Metadata of the literally matched token of every hit.
pub fn count_matched(hits: &[SearchHit], field: MetaField) -> Histogram {
    count_offset(hits, field, 0)
}

/// Metadata of the token that received the most attention from each match.
pub fn count_max_att(hits: &[SearchHit], field: MetaField) -> Histogram {
    hits.iter()
        .map(|hit| match hit.max_att_index().and_then(|i| hit.tokens.get(i)) {
            Some(t) => field.category(t),
            None => NULL_CATEGORY.to_string(),
        })
        .collect()
}

pub fn count_offset(hits: &[SearchHit], field: MetaField, offset: i32) -> Histogram {
    hits.iter()
        .map(|hit| field.category(&hit.token_at_offset(offset)))
        .collect()
}

/// One histogram per offset in `window`, in window order.
pub fn offset_histograms(
    hits: &[SearchHit],
    field: MetaField,
    window: &[i32],
) -> Vec<(i32, Histogram)> {
    window
        .iter()
        .map(|o| (*o, count_offset(hits, field, *o)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(text: &str, pos: &str) -> TokenMeta {
        TokenMeta {
            text: text.to_string(),
            pos: Some(pos.to_string()),
            dep: Some("dep".to_string()),
            norm: Some(text.to_lowercase()),
            is_ent: Some(false),
            ..TokenMeta::default()
        }
    }

    fn hits() -> Vec<SearchHit> {
        vec![
            SearchHit {
                sentence: "the cat sat".to_string(),
                index: 1,
                tokens: vec![tok("the", "DET"), tok("cat", "NOUN"), tok("sat", "VERB")],
                matched_att: vec![0.2, 0.1, 0.7],
            },
            SearchHit {
                sentence: "dogs bark".to_string(),
                index: 0,
                tokens: vec![tok("dogs", "NOUN"), tok("bark", "VERB")],
                matched_att: vec![0.9, 0.1],
            },
        ]
    }

    #[test]
    fn matched_and_max_att_count_differently() {
        let h = hits();
        let matched = count_matched(&h, MetaField::Pos);
        assert_eq!(matched.get("NOUN"), 2);
        assert_eq!(matched.total(), 2);

        let max = count_max_att(&h, MetaField::Pos);
        assert_eq!(max.get("VERB"), 1);
        assert_eq!(max.get("NOUN"), 1);
    }

    #[test]
    fn out_of_range_offsets_use_null_sentinel() {
        let h = hits();
        let left = count_offset(&h, MetaField::Pos, -1);
        assert_eq!(left.get("DET"), 1);
        assert_eq!(left.get(NULL_CATEGORY), 1);

        let far = count_offset(&h, MetaField::Dep, 5);
        assert_eq!(far.get(NULL_CATEGORY), 2);
    }

    #[test]
    fn offset_window_keeps_order() {
        let h = hits();
        let win = offset_histograms(&h, MetaField::Pos, &[-1, 0, 1]);
        assert_eq!(win.iter().map(|(o, _)| *o).collect::<Vec<_>>(), vec![-1, 0, 1]);
        assert_eq!(win[2].1.get("VERB"), 2);
    }

    #[test]
    fn first_maximum_wins_ties() {
        let hit = SearchHit {
            sentence: String::new(),
            index: 0,
            tokens: vec![tok("a", "X"), tok("b", "Y")],
            matched_att: vec![0.5, 0.5],
        };
        assert_eq!(hit.max_att_index(), Some(0));
    }

    #[test]
    fn sorted_orders_by_count_then_label() {
        let h: Histogram = ["b", "a", "c", "c"].into_iter().collect();
        assert_eq!(
            h.sorted(),
            vec![("c".to_string(), 2), ("a".to_string(), 1), ("b".to_string(), 1)]
        );
    }

    #[test]
    fn is_ent_category_spells_booleans() {
        let mut t = tok("Paris", "PROPN");
        t.is_ent = Some(true);
        assert_eq!(MetaField::IsEnt.category(&t), "true");
        assert_eq!(MetaField::IsEnt.category(&TokenMeta::null_filler("[SEP]")), "null");
    }
}
