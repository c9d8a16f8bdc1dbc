//! View configuration kept in sync with the page query string.
//!
//! [`ConfigStore`] is the single source of truth for every user-tunable view
//! parameter. Each setter re-serializes the whole record and hands it to a
//! [`HistorySink`], pushing a new history entry for the sentence and replacing
//! the current one for everything else.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::float_fmt::fmt_f64_trimmed;
use crate::search::MetaField;

/// Prefix that marks a comma-joined list value in the query string.
pub const ARRAY_MARKER: &str = "__";

pub mod keys {
    pub const SENTENCE: &str = "sentence";
    pub const LAYER: &str = "layer";
    pub const HEADS: &str = "heads";
    pub const THRESHOLD: &str = "threshold";
    pub const TOKEN_IND: &str = "tokenInd";
    pub const TOKEN_SIDE: &str = "tokenSide";
    pub const MASK_INDS: &str = "maskInds";
    pub const META_MATCH: &str = "metaMatch";
    pub const META_MAX: &str = "metaMax";
    pub const DISPLAY_INSPECTOR: &str = "displayInspector";
    pub const OFFSET_IDXS: &str = "offsetIdxs";
    pub const HIDE_CLS_SEP: &str = "hideClsSep";
}

// ---------------------------------------------------------------------------
// Query-string codec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum UrlValue {
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<UrlValue>),
}

impl UrlValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            UrlValue::Int(i) => Some(*i),
            UrlValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            UrlValue::Int(i) => Some(*i as f64),
            UrlValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            UrlValue::Text(s) if s == "true" => Some(true),
            UrlValue::Text(s) if s == "false" => Some(false),
            UrlValue::Int(1) => Some(true),
            UrlValue::Int(0) => Some(false),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[UrlValue]> {
        match self {
            UrlValue::List(items) => Some(items),
            _ => None,
        }
    }

    fn encode_scalar_raw(&self) -> String {
        match self {
            UrlValue::Int(i) => i.to_string(),
            UrlValue::Float(f) => fmt_f64_trimmed(*f, 6),
            UrlValue::Text(s) => s.clone(),
            UrlValue::List(_) => String::new(),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            UrlValue::List(items) => {
                let joined: Vec<String> = items.iter().map(UrlValue::encode).collect();
                format!("{ARRAY_MARKER}{}", joined.join(","))
            }
            UrlValue::Text(s) if s.starts_with(ARRAY_MARKER) => {
                // Keep a literal leading "__" from reading back as a list.
                format!("%5F{}", percent_encode(&s[1..]))
            }
            other => percent_encode(&other.encode_scalar_raw()),
        }
    }
}

impl From<&str> for UrlValue {
    fn from(s: &str) -> Self {
        UrlValue::Text(s.to_string())
    }
}

impl From<bool> for UrlValue {
    fn from(b: bool) -> Self {
        let s = if b { "true" } else { "false" };
        UrlValue::Text(s.to_string())
    }
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~')
}

pub fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(hex_digit(b >> 4));
            out.push(hex_digit(b & 0x0F));
        }
    }
    out
}

fn hex_digit(n: u8) -> char {
    char::from_digit(n as u32, 16)
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or('0')
}

/// Decodes `%XX` escapes and `+` as a space. Malformed escapes pass through.
pub fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                (Some(hi), Some(lo)) => {
                    out.push(hi << 4 | lo);
                    i += 3;
                }
                _ => {
                    out.push(b'%');
                    i += 1;
                }
            },
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

fn looks_numeric(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().any(|b| b.is_ascii_digit())
        && s
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E'))
}

/// Integer- and float-looking text becomes a number; everything else stays text.
pub fn coerce(s: &str) -> UrlValue {
    if looks_numeric(s) {
        if let Ok(i) = s.parse::<i64>() {
            return UrlValue::Int(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            if f.is_finite() {
                return UrlValue::Float(f);
            }
        }
    }
    UrlValue::Text(s.to_string())
}

fn decode_value(raw: &str) -> UrlValue {
    match raw.strip_prefix(ARRAY_MARKER) {
        Some("") => UrlValue::List(Vec::new()),
        Some(rest) => UrlValue::List(
            rest.split(',')
                .map(|item| coerce(&percent_decode(item)))
                .collect(),
        ),
        None => coerce(&percent_decode(raw)),
    }
}

/// Decoded keys paired with their still-encoded values.
fn split_pairs(query: &str) -> impl Iterator<Item = (String, &str)> + '_ {
    query
        .strip_prefix('?')
        .unwrap_or(query)
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            (percent_decode(k), v)
        })
}

/// A scalar value as written, before numeric coercion. `None` for lists.
fn decode_text(raw: &str) -> Option<String> {
    if raw.starts_with(ARRAY_MARKER) {
        None
    } else {
        Some(percent_decode(raw))
    }
}

/// Parses `?a=1&b=__1,2` (leading `?` optional) into ordered pairs.
pub fn parse_query(query: &str) -> Vec<(String, UrlValue)> {
    split_pairs(query)
        .map(|(k, v)| (k, decode_value(v)))
        .collect()
}

pub fn to_query(pairs: &[(String, UrlValue)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), v.encode()))
        .collect::<Vec<_>>()
        .join("&")
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Receives the serialized query string after every configuration write.
pub trait HistorySink {
    /// New navigation entry (back/forward can return to the previous one).
    fn push(&mut self, query: &str);
    /// Overwrite the current entry.
    fn replace(&mut self, query: &str);
}

/// In-memory history stack.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    pub entries: Vec<String>,
    pub pushes: usize,
    pub replaces: usize,
}

impl MemoryHistory {
    pub fn current(&self) -> Option<&str> {
        self.entries.last().map(String::as_str)
    }
}

impl HistorySink for MemoryHistory {
    fn push(&mut self, query: &str) {
        self.entries.push(query.to_string());
        self.pushes += 1;
    }

    fn replace(&mut self, query: &str) {
        match self.entries.last_mut() {
            Some(last) => *last = query.to_string(),
            None => self.entries.push(query.to_string()),
        }
        self.replaces += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HistoryWrite {
    Push,
    Replace,
}

// ---------------------------------------------------------------------------
// Field types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Side::Left),
            "right" => Some(Side::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenSelection {
    pub side: Side,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenToggle {
    Selected(TokenSelection),
    Deselected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadToggle {
    Added,
    Removed,
    OutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InspectorMode {
    #[default]
    Context,
    Embeddings,
}

impl InspectorMode {
    pub fn as_str(self) -> &'static str {
        match self {
            InspectorMode::Context => "context",
            InspectorMode::Embeddings => "embeddings",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "context" => Some(InspectorMode::Context),
            "embeddings" => Some(InspectorMode::Embeddings),
            _ => None,
        }
    }
}

/// Values used for anything the URL does not specify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewDefaults {
    pub sentence: String,
    pub layer: u32,
    pub n_heads: usize,
    pub threshold: f32,
    pub meta_match: MetaField,
    pub meta_max: MetaField,
    pub inspector_mode: InspectorMode,
    pub offset_window: Vec<i32>,
    pub hide_special: bool,
}

impl Default for ViewDefaults {
    fn default() -> Self {
        Self {
            sentence: "The girl ran to a local pub to escape the din of her city.".to_string(),
            layer: 1,
            n_heads: 12,
            threshold: 0.7,
            meta_match: MetaField::Pos,
            meta_max: MetaField::Pos,
            inspector_mode: InspectorMode::Context,
            offset_window: vec![-1, 0, 1],
            hide_special: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct ConfigStore<H: HistorySink> {
    sentence: String,
    layer: u32,
    n_heads: usize,
    heads: BTreeSet<usize>,
    /// Heads named by the URL, kept whole until a model reports its head count.
    url_heads: Option<BTreeSet<usize>>,
    threshold: f32,
    token: Option<TokenSelection>,
    mask_inds: Vec<usize>,
    meta_match: MetaField,
    meta_max: MetaField,
    inspector_mode: InspectorMode,
    offset_window: Vec<i32>,
    hide_special: bool,
    history: H,
}

/// Clamped to `[0, 1]` and snapped to the six decimals the URL carries.
fn clamp_threshold(t: f32) -> f32 {
    if !t.is_finite() {
        return 0.0;
    }
    ((f64::from(t.clamp(0.0, 1.0)) * 1e6).round() / 1e6) as f32
}

fn usize_list(v: &UrlValue) -> Option<Vec<usize>> {
    v.as_list().map(|items| {
        items
            .iter()
            .filter_map(UrlValue::as_i64)
            .filter(|i| *i >= 0)
            .map(|i| i as usize)
            .collect()
    })
}

impl<H: HistorySink> ConfigStore<H> {
    /// Builds the store from a query string. Unknown or malformed values fall
    /// back to `defaults`. The history is not touched until the first write.
    pub fn from_query(query: &str, defaults: &ViewDefaults, history: H) -> Self {
        let mut store = Self {
            sentence: defaults.sentence.clone(),
            layer: defaults.layer,
            n_heads: defaults.n_heads,
            heads: (0..defaults.n_heads).collect(),
            url_heads: None,
            threshold: clamp_threshold(defaults.threshold),
            token: None,
            mask_inds: Vec::new(),
            meta_match: defaults.meta_match,
            meta_max: defaults.meta_max,
            inspector_mode: defaults.inspector_mode,
            offset_window: defaults.offset_window.clone(),
            hide_special: defaults.hide_special,
            history,
        };

        let mut token_ind: Option<usize> = None;
        let mut token_side: Option<Side> = None;

        for (key, raw) in split_pairs(query) {
            let value = decode_value(raw);
            match key.as_str() {
                keys::SENTENCE => {
                    if let Some(s) = decode_text(raw) {
                        store.sentence = s;
                    }
                }
                keys::LAYER => {
                    if let Some(l) = value.as_i64().filter(|l| *l >= 0) {
                        store.layer = l as u32;
                    }
                }
                keys::HEADS => {
                    if let Some(h) = usize_list(&value) {
                        let named: BTreeSet<usize> = h.into_iter().collect();
                        store.heads = named.iter().copied().filter(|h| *h < store.n_heads).collect();
                        store.url_heads = Some(named);
                    }
                }
                keys::THRESHOLD => {
                    if let Some(t) = value.as_f64() {
                        store.threshold = clamp_threshold(t as f32);
                    }
                }
                keys::TOKEN_IND => token_ind = value.as_i64().filter(|i| *i >= 0).map(|i| i as usize),
                keys::TOKEN_SIDE => token_side = decode_text(raw).as_deref().and_then(Side::parse),
                keys::MASK_INDS => {
                    if let Some(m) = usize_list(&value) {
                        store.mask_inds = m;
                    }
                }
                keys::META_MATCH => {
                    if let Some(f) = decode_text(raw).as_deref().and_then(MetaField::parse) {
                        store.meta_match = f;
                    }
                }
                keys::META_MAX => {
                    if let Some(f) = decode_text(raw).as_deref().and_then(MetaField::parse) {
                        store.meta_max = f;
                    }
                }
                keys::DISPLAY_INSPECTOR => {
                    if let Some(m) = decode_text(raw).as_deref().and_then(InspectorMode::parse) {
                        store.inspector_mode = m;
                    }
                }
                keys::OFFSET_IDXS => {
                    if let Some(items) = value.as_list() {
                        store.offset_window = items
                            .iter()
                            .filter_map(UrlValue::as_i64)
                            .map(|i| i as i32)
                            .collect();
                    }
                }
                keys::HIDE_CLS_SEP => {
                    if let Some(b) = value.as_bool() {
                        store.hide_special = b;
                    }
                }
                other => tracing::debug!(key = other, "ignoring unknown url parameter"),
            }
        }

        if let (Some(index), Some(side)) = (token_ind, token_side) {
            store.token = Some(TokenSelection { side, index });
        }
        store
    }

    pub fn to_pairs(&self) -> Vec<(String, UrlValue)> {
        let mut pairs = vec![
            (keys::SENTENCE.to_string(), UrlValue::Text(self.sentence.clone())),
            (keys::LAYER.to_string(), UrlValue::Int(self.layer as i64)),
            (
                keys::HEADS.to_string(),
                UrlValue::List(
                    self.url_heads
                        .as_ref()
                        .unwrap_or(&self.heads)
                        .iter()
                        .map(|h| UrlValue::Int(*h as i64))
                        .collect(),
                ),
            ),
            (
                keys::THRESHOLD.to_string(),
                UrlValue::Float(self.threshold as f64),
            ),
        ];
        if let Some(tok) = self.token {
            pairs.push((keys::TOKEN_IND.to_string(), UrlValue::Int(tok.index as i64)));
            pairs.push((keys::TOKEN_SIDE.to_string(), tok.side.as_str().into()));
        }
        pairs.extend([
            (
                keys::MASK_INDS.to_string(),
                UrlValue::List(
                    self.mask_inds
                        .iter()
                        .map(|m| UrlValue::Int(*m as i64))
                        .collect(),
                ),
            ),
            (keys::META_MATCH.to_string(), self.meta_match.as_str().into()),
            (keys::META_MAX.to_string(), self.meta_max.as_str().into()),
            (
                keys::DISPLAY_INSPECTOR.to_string(),
                self.inspector_mode.as_str().into(),
            ),
            (
                keys::OFFSET_IDXS.to_string(),
                UrlValue::List(
                    self.offset_window
                        .iter()
                        .map(|o| UrlValue::Int(*o as i64))
                        .collect(),
                ),
            ),
            (keys::HIDE_CLS_SEP.to_string(), self.hide_special.into()),
        ]);
        pairs
    }

    pub fn to_query(&self) -> String {
        to_query(&self.to_pairs())
    }

    fn sync(&mut self, mode: HistoryWrite) {
        let query = self.to_query();
        match mode {
            HistoryWrite::Push => self.history.push(&query),
            HistoryWrite::Replace => self.history.replace(&query),
        }
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn sentence(&self) -> &str {
        &self.sentence
    }

    /// Pushes a history entry so back/forward moves between analyzed sentences.
    pub fn set_sentence(&mut self, sentence: impl Into<String>) {
        self.sentence = sentence.into();
        self.sync(HistoryWrite::Push);
    }

    /// New sentence with the token selection and masks cleared, in one push.
    pub fn begin_sentence(&mut self, sentence: impl Into<String>) {
        self.token = None;
        self.mask_inds.clear();
        self.set_sentence(sentence);
    }

    pub fn layer(&self) -> u32 {
        self.layer
    }

    pub fn set_layer(&mut self, layer: u32) {
        self.layer = layer;
        self.sync(HistoryWrite::Replace);
    }

    pub fn n_heads(&self) -> usize {
        self.n_heads
    }

    /// Adopts a new head count. The first call resolves the URL's head list
    /// against it; later calls drop selected heads that no longer exist.
    pub fn set_n_heads(&mut self, n_heads: usize) {
        let named = self.url_heads.take();
        if n_heads == self.n_heads && named.is_none() {
            return;
        }
        self.n_heads = n_heads;
        match named {
            Some(named) => self.heads = named.into_iter().filter(|h| *h < n_heads).collect(),
            None => self.heads.retain(|h| *h < n_heads),
        }
        self.sync(HistoryWrite::Replace);
    }

    pub fn heads(&self) -> Vec<usize> {
        self.heads.iter().copied().collect()
    }

    pub fn has_head(&self, head: usize) -> bool {
        self.heads.contains(&head)
    }

    /// Replaces the selection; out-of-range heads are dropped.
    pub fn set_heads(&mut self, heads: impl IntoIterator<Item = usize>) {
        let n = self.n_heads;
        self.url_heads = None;
        self.heads = heads.into_iter().filter(|h| *h < n).collect();
        self.sync(HistoryWrite::Replace);
    }

    pub fn select_all_heads(&mut self) {
        self.url_heads = None;
        self.heads = (0..self.n_heads).collect();
        self.sync(HistoryWrite::Replace);
    }

    pub fn select_no_heads(&mut self) {
        self.url_heads = None;
        self.heads.clear();
        self.sync(HistoryWrite::Replace);
    }

    pub fn toggle_head(&mut self, head: usize) -> HeadToggle {
        if head >= self.n_heads {
            return HeadToggle::OutOfRange;
        }
        self.url_heads = None;
        let outcome = if self.heads.remove(&head) {
            HeadToggle::Removed
        } else {
            self.heads.insert(head);
            HeadToggle::Added
        };
        self.sync(HistoryWrite::Replace);
        outcome
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = clamp_threshold(threshold);
        self.sync(HistoryWrite::Replace);
    }

    pub fn token(&self) -> Option<TokenSelection> {
        self.token
    }

    pub fn set_token(&mut self, token: Option<TokenSelection>) {
        self.token = token;
        self.sync(HistoryWrite::Replace);
    }

    /// Same token again deselects; any other token replaces the selection.
    pub fn toggle_token(&mut self, sel: TokenSelection) -> TokenToggle {
        let outcome = if self.token == Some(sel) {
            self.token = None;
            TokenToggle::Deselected
        } else {
            self.token = Some(sel);
            TokenToggle::Selected(sel)
        };
        self.sync(HistoryWrite::Replace);
        outcome
    }

    pub fn mask_inds(&self) -> &[usize] {
        &self.mask_inds
    }

    pub fn set_mask_inds(&mut self, mask_inds: Vec<usize>) {
        self.mask_inds = mask_inds;
        self.sync(HistoryWrite::Replace);
    }

    /// Adds or removes one masked index; returns whether it is now masked.
    pub fn toggle_mask(&mut self, index: usize) -> bool {
        let masked = match self.mask_inds.iter().position(|m| *m == index) {
            Some(pos) => {
                self.mask_inds.remove(pos);
                false
            }
            None => {
                self.mask_inds.push(index);
                self.mask_inds.sort_unstable();
                true
            }
        };
        self.sync(HistoryWrite::Replace);
        masked
    }

    pub fn meta_match(&self) -> MetaField {
        self.meta_match
    }

    pub fn set_meta_match(&mut self, field: MetaField) {
        self.meta_match = field;
        self.sync(HistoryWrite::Replace);
    }

    pub fn meta_max(&self) -> MetaField {
        self.meta_max
    }

    pub fn set_meta_max(&mut self, field: MetaField) {
        self.meta_max = field;
        self.sync(HistoryWrite::Replace);
    }

    pub fn inspector_mode(&self) -> InspectorMode {
        self.inspector_mode
    }

    pub fn set_inspector_mode(&mut self, mode: InspectorMode) {
        self.inspector_mode = mode;
        self.sync(HistoryWrite::Replace);
    }

    pub fn offset_window(&self) -> &[i32] {
        &self.offset_window
    }

    pub fn set_offset_window(&mut self, offsets: Vec<i32>) {
        self.offset_window = offsets;
        self.sync(HistoryWrite::Replace);
    }

    pub fn hide_special(&self) -> bool {
        self.hide_special
    }

    pub fn set_hide_special(&mut self, hide: bool) {
        self.hide_special = hide;
        self.sync(HistoryWrite::Replace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(query: &str) -> ConfigStore<MemoryHistory> {
        ConfigStore::from_query(query, &ViewDefaults::default(), MemoryHistory::default())
    }

    #[test]
    fn codec_marks_lists_and_coerces_numbers() {
        let pairs = parse_query("?layer=3&threshold=0.25&heads=__0,2,5&name=pub&empty=__");
        assert_eq!(pairs[0], ("layer".to_string(), UrlValue::Int(3)));
        assert_eq!(pairs[1], ("threshold".to_string(), UrlValue::Float(0.25)));
        assert_eq!(
            pairs[2].1,
            UrlValue::List(vec![UrlValue::Int(0), UrlValue::Int(2), UrlValue::Int(5)])
        );
        assert_eq!(pairs[3].1, UrlValue::Text("pub".to_string()));
        assert_eq!(pairs[4].1, UrlValue::List(Vec::new()));
    }

    #[test]
    fn codec_round_trips_text_with_reserved_characters() {
        let pairs = vec![
            (
                "sentence".to_string(),
                UrlValue::Text("a, b & c = d?".to_string()),
            ),
            ("lit".to_string(), UrlValue::Text("__not a list".to_string())),
            (
                "words".to_string(),
                UrlValue::List(vec!["x,y".into(), UrlValue::Int(-1)]),
            ),
        ];
        assert_eq!(parse_query(&to_query(&pairs)), pairs);
    }

    #[test]
    fn record_round_trips_through_query() {
        let mut s = store("");
        s.set_sentence("The dog barked.");
        s.set_layer(7);
        s.set_heads([1, 3, 11]);
        s.set_threshold(0.35);
        s.set_token(Some(TokenSelection {
            side: Side::Right,
            index: 4,
        }));
        s.set_mask_inds(vec![2, 5]);
        s.set_meta_match(MetaField::Dep);
        s.set_meta_max(MetaField::IsEnt);
        s.set_inspector_mode(InspectorMode::Embeddings);
        s.set_offset_window(vec![-2, 0, 2]);
        s.set_hide_special(false);

        let back = store(&s.to_query());
        assert_eq!(back.sentence(), "The dog barked.");
        assert_eq!(back.layer(), 7);
        assert_eq!(back.heads(), vec![1, 3, 11]);
        assert_eq!(back.threshold(), 0.35);
        assert_eq!(back.token(), s.token());
        assert_eq!(back.mask_inds(), &[2, 5]);
        assert_eq!(back.meta_match(), MetaField::Dep);
        assert_eq!(back.meta_max(), MetaField::IsEnt);
        assert_eq!(back.inspector_mode(), InspectorMode::Embeddings);
        assert_eq!(back.offset_window(), &[-2, 0, 2]);
        assert!(!back.hide_special());
        assert_eq!(back.to_query(), s.to_query());
    }

    #[test]
    fn numeric_sentence_survives_coercion() {
        for sentence in ["42", "007", "2.50", "1e3", "+5", "3.0", "-0"] {
            let mut s = store("");
            s.set_sentence(sentence);
            let back = store(&s.to_query());
            assert_eq!(back.sentence(), sentence);
            assert_eq!(back.to_query(), s.to_query());
        }
    }

    #[test]
    fn numeric_looking_choice_fields_are_read_as_text() {
        let s = store("tokenInd=1&tokenSide=left&metaMatch=dep&displayInspector=embeddings");
        assert_eq!(
            s.token(),
            Some(TokenSelection {
                side: Side::Left,
                index: 1
            })
        );
        assert_eq!(s.meta_match(), MetaField::Dep);
        assert_eq!(s.inspector_mode(), InspectorMode::Embeddings);
        let s = store("tokenInd=1&tokenSide=1&metaMatch=2");
        assert_eq!(s.token(), None);
        assert_eq!(s.meta_match(), ViewDefaults::default().meta_match);
    }

    #[test]
    fn threshold_reloads_to_the_stored_value() {
        for (written, kept) in [(0.12345679, 0.123457), (4e-7, 0.0), (6e-7, 1e-6), (0.35, 0.35)] {
            let mut s = store("");
            s.set_threshold(written);
            assert_eq!(s.threshold(), kept);
            assert_eq!(store(&s.to_query()).threshold(), s.threshold());
        }
    }

    #[test]
    fn url_heads_wait_for_the_model_head_count() {
        let mut s = store("heads=__1,12,13");
        assert_eq!(s.heads(), vec![1]);
        s.set_layer(2);
        assert!(s.to_query().contains("heads=__1,12,13"));

        s.set_n_heads(16);
        assert_eq!(s.heads(), vec![1, 12, 13]);
        s.set_n_heads(13);
        assert_eq!(s.heads(), vec![1, 12]);
    }

    #[test]
    fn url_heads_are_resolved_even_when_the_count_matches() {
        let mut s = store("heads=__0,40");
        s.set_n_heads(12);
        assert_eq!(s.heads(), vec![0]);
        assert!(s.history().current().unwrap().contains("heads=__0&"));
    }

    #[test]
    fn sentence_pushes_other_fields_replace() {
        let mut s = store("");
        s.set_sentence("one");
        s.set_sentence("two");
        s.set_layer(3);
        s.set_threshold(0.5);
        let h = s.history();
        assert_eq!(h.pushes, 2);
        assert_eq!(h.replaces, 2);
        assert_eq!(h.entries.len(), 2);
        assert!(h.current().unwrap().contains("sentence=two"));
        assert!(h.current().unwrap().contains("layer=3"));
    }

    #[test]
    fn begin_sentence_leaves_previous_entry_intact() {
        let mut s = store("?sentence=old&maskInds=__2&tokenInd=1&tokenSide=left");
        s.set_layer(4);
        let before = s.history().current().unwrap().to_string();

        s.begin_sentence("new");
        let h = s.history();
        assert_eq!(h.entries, vec![before.clone(), s.to_query()]);
        assert!(before.contains("maskInds=__2"));
        assert_eq!(s.token(), None);
        assert!(s.mask_inds().is_empty());
    }

    #[test]
    fn toggle_token_is_an_involution() {
        let mut s = store("");
        let original = s.token();
        let sel = TokenSelection {
            side: Side::Left,
            index: 2,
        };
        assert_eq!(s.toggle_token(sel), TokenToggle::Selected(sel));
        assert_eq!(s.toggle_token(sel), TokenToggle::Deselected);
        assert_eq!(s.token(), original);
    }

    #[test]
    fn toggle_token_replaces_other_selection() {
        let mut s = store("");
        let a = TokenSelection {
            side: Side::Left,
            index: 2,
        };
        let b = TokenSelection {
            side: Side::Right,
            index: 2,
        };
        s.toggle_token(a);
        assert_eq!(s.toggle_token(b), TokenToggle::Selected(b));
        assert_eq!(s.token(), Some(b));
    }

    #[test]
    fn toggle_head_alternates_and_tracks_membership() {
        let mut s = store("");
        s.select_no_heads();
        for expected in [HeadToggle::Added, HeadToggle::Removed, HeadToggle::Added] {
            assert_eq!(s.toggle_head(5), expected);
            assert_eq!(s.has_head(5), expected == HeadToggle::Added);
        }
        assert_eq!(s.toggle_head(12), HeadToggle::OutOfRange);
        assert_eq!(s.heads(), vec![5]);
    }

    #[test]
    fn invariants_hold_for_hostile_urls() {
        let s = store("heads=__0,3,99,-1&threshold=4.5&tokenInd=3");
        assert_eq!(s.heads(), vec![0, 3]);
        assert_eq!(s.threshold(), 1.0);
        assert_eq!(s.token(), None);

        let mut s = s;
        s.set_threshold(-0.2);
        assert_eq!(s.threshold(), 0.0);
        s.select_all_heads();
        s.set_n_heads(4);
        assert_eq!(s.heads(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn toggle_mask_keeps_sorted_unique_indexes() {
        let mut s = store("");
        assert!(s.toggle_mask(4));
        assert!(s.toggle_mask(1));
        assert_eq!(s.mask_inds(), &[1, 4]);
        assert!(!s.toggle_mask(4));
        assert_eq!(s.mask_inds(), &[1]);
    }
}
