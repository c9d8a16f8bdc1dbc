//! Per-head heatmap beside one token column; clicking a column picks a head.

use crate::attention::Matrix;
use crate::component::{Point, Rect, Surface, Widget};
use crate::config::Side;

use super::{head_color, slot_positions, BG, TEXT};

const PAD: f64 = 4.0;
const MAX_CELL: f64 = 22.0;
const DIMMED: f32 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct HeadBoxInput {
    /// One matrix per head, from the active (possibly zeroed) view.
    pub heads: Vec<Matrix>,
    pub side: Side,
    pub selected: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeadSummary {
    pub side: Side,
    /// `values[head][token]`, each head scaled so its largest entry is 1.
    pub values: Vec<Vec<f32>>,
    pub selected: Vec<bool>,
}

impl HeadSummary {
    pub fn n_tokens(&self) -> usize {
        self.values.first().map(Vec::len).unwrap_or(0)
    }
}

/// Outgoing mass per query row.
fn row_mass(m: &Matrix) -> Vec<f32> {
    m.iter_rows().map(|r| r.iter().sum()).collect()
}

/// Mean incoming mass per key column.
fn col_mean(m: &Matrix) -> Vec<f32> {
    let mut out = vec![0.0f32; m.cols()];
    for row in m.iter_rows() {
        for (acc, v) in out.iter_mut().zip(row) {
            *acc += *v;
        }
    }
    if m.rows() > 0 {
        let n = m.rows() as f32;
        out.iter_mut().for_each(|v| *v /= n);
    }
    out
}

fn normalize(values: &mut [f32]) {
    let max = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0f32, f32::max);
    for v in values.iter_mut() {
        *v = if max > 0.0 && v.is_finite() {
            (*v / max).clamp(0.0, 1.0)
        } else {
            0.0
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Grid {
    x0: f64,
    y0: f64,
    cell_w: f64,
    cell_h: f64,
    n_heads: usize,
    n_tokens: usize,
}

#[derive(Debug, Default)]
pub struct AttentionHeadBox {
    grid: Option<Grid>,
}

impl AttentionHeadBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Head column under `(x, y)` from the last render.
    pub fn head_at(&self, x: f64, y: f64) -> Option<usize> {
        let g = self.grid?;
        let bounds = Rect::new(
            g.x0,
            g.y0,
            g.cell_w * g.n_heads as f64,
            g.cell_h * g.n_tokens as f64,
        );
        if !bounds.contains(Point::new(x, y)) {
            return None;
        }
        let h = ((x - g.x0) / g.cell_w) as usize;
        (h < g.n_heads).then_some(h)
    }
}

impl<S: Surface> Widget<S> for AttentionHeadBox {
    type Input = HeadBoxInput;
    type RenderData = HeadSummary;

    fn wrangle(&self, input: &HeadBoxInput) -> HeadSummary {
        let values = input
            .heads
            .iter()
            .map(|m| {
                let mut v = match input.side {
                    Side::Left => row_mass(m),
                    Side::Right => col_mean(m),
                };
                normalize(&mut v);
                v
            })
            .collect();
        let selected = (0..input.heads.len())
            .map(|h| input.selected.contains(&h))
            .collect();
        HeadSummary {
            side: input.side,
            values,
            selected,
        }
    }

    fn render(&mut self, mount: &mut S, data: &HeadSummary) {
        let (w, h) = mount.size();
        let n_heads = data.values.len();
        let n_tokens = data.n_tokens();
        let (_, cell_w) = slot_positions(n_heads, PAD, w - 2.0 * PAD, MAX_CELL);
        let (_, cell_h) = slot_positions(n_tokens, PAD, h - 2.0 * PAD, MAX_CELL);
        let grid = Grid {
            x0: PAD,
            y0: PAD,
            cell_w,
            cell_h,
            n_heads,
            n_tokens,
        };
        self.grid = Some(grid);

        mount.clear(BG);
        for (head, column) in data.values.iter().enumerate() {
            let on = data.selected.get(head).copied().unwrap_or(false);
            let base = head_color(head);
            let x = grid.x0 + cell_w * head as f64;
            for (tok, v) in column.iter().enumerate() {
                let alpha = if on { *v } else { *v * DIMMED };
                let y = grid.y0 + cell_h * tok as f64;
                mount.fill_rect(Rect::new(x, y, cell_w, cell_h), base.with_alpha(alpha));
            }
            if on {
                mount.stroke_rect(
                    Rect::new(x, grid.y0, cell_w, cell_h * n_tokens as f64),
                    1.0,
                    TEXT,
                );
            }
        }
    }
}
