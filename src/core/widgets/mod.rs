//! Visual widgets built on [`crate::component::Widget`].

pub mod attention_graph;
pub mod head_box;
pub mod histogram;
pub mod text_tokens;

pub use attention_graph::{AttentionGraph, GraphData, GraphInput};
pub use head_box::{AttentionHeadBox, HeadBoxInput, HeadSummary};
pub use histogram::{CorpusHistogram, HistogramBars, HistogramInput};
pub use text_tokens::{TextTokens, TextTokensInput, TokenRow};

use crate::component::Rgba;

pub(crate) const BG: Rgba = Rgba::rgb(10, 15, 26);
pub(crate) const TEXT: Rgba = Rgba::rgb(224, 230, 237);
pub(crate) const TEXT_DIM: Rgba = Rgba::rgb(107, 114, 128);
pub(crate) const ACCENT: Rgba = Rgba::rgb(122, 162, 255);
pub(crate) const HIGHLIGHT: Rgba = Rgba::rgb(251, 191, 36);
pub(crate) const MASKED: Rgba = Rgba::rgb(251, 113, 133);

/// Distinct series colors, one per attention head (wraps after eight).
pub(crate) const HEAD_COLORS: [Rgba; 8] = [
    Rgba::rgb(122, 162, 255),
    Rgba::rgb(251, 191, 36),
    Rgba::rgb(74, 222, 128),
    Rgba::rgb(251, 113, 133),
    Rgba::rgb(167, 139, 250),
    Rgba::rgb(34, 197, 94),
    Rgba::rgb(96, 165, 250),
    Rgba::rgb(232, 121, 249),
];

pub(crate) fn head_color(head: usize) -> Rgba {
    HEAD_COLORS[head % HEAD_COLORS.len()]
}

/// Evenly spaced slots for `n` items across `extent`, capped at `max_step`.
pub(crate) fn slot_positions(n: usize, start: f64, extent: f64, max_step: f64) -> (Vec<f64>, f64) {
    if n == 0 {
        return (Vec::new(), 0.0);
    }
    let step = (extent / n as f64).min(max_step).max(1.0);
    let positions = (0..n).map(|i| start + step * (i as f64 + 0.5)).collect();
    (positions, step)
}
