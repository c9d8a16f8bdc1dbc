//! Two token columns joined by thresholded, opacity-scaled attention edges.

use crate::attention::Matrix;
use crate::component::{Point, Surface, Widget};
use crate::config::{Side, TokenSelection};
use crate::edges::{to_edges, AxisExtents, Edge, OpacityScale, ScaleMode};

use super::{slot_positions, ACCENT, BG, HIGHLIGHT, TEXT, TEXT_DIM};

const PAD: f64 = 12.0;
const LABEL_W: f64 = 90.0;
const MAX_ROW_H: f64 = 22.0;

#[derive(Debug, Clone, PartialEq)]
pub struct GraphInput {
    /// Query × key weights, usually the sum over the selected heads.
    pub matrix: Matrix,
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub threshold: f32,
    pub scale: ScaleMode,
    pub selected: Option<TokenSelection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub edge: Edge,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphData {
    pub edges: Vec<GraphEdge>,
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub selected: Option<TokenSelection>,
}

#[derive(Debug, Clone, PartialEq)]
struct Layout {
    size: (f64, f64),
    left_x: f64,
    right_x: f64,
    left_y: Vec<f64>,
    right_y: Vec<f64>,
    row_h: f64,
}

#[derive(Debug, Default)]
pub struct AttentionGraph {
    layout: Option<Layout>,
}

impl AttentionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached while the surface size and token counts stay the same.
    fn layout_for(&mut self, size: (f64, f64), n_left: usize, n_right: usize) -> Layout {
        if let Some(l) = &self.layout {
            if l.size == size && l.left_y.len() == n_left && l.right_y.len() == n_right {
                return l.clone();
            }
        }
        let (w, h) = size;
        let rows = n_left.max(n_right);
        let (_, row_h) = slot_positions(rows, PAD, h - 2.0 * PAD, MAX_ROW_H);
        let (left_y, _) = slot_positions(n_left, PAD, row_h * n_left as f64, row_h);
        let (right_y, _) = slot_positions(n_right, PAD, row_h * n_right as f64, row_h);
        let layout = Layout {
            size,
            left_x: PAD + LABEL_W,
            right_x: w - PAD - LABEL_W,
            left_y,
            right_y,
            row_h,
        };
        self.layout = Some(layout.clone());
        layout
    }

    /// Token under `p` from the last render, if any.
    pub fn token_at(&self, p: Point) -> Option<TokenSelection> {
        let l = self.layout.as_ref()?;
        let (side, ys) = if p.x <= l.left_x {
            (Side::Left, &l.left_y)
        } else if p.x >= l.right_x {
            (Side::Right, &l.right_y)
        } else {
            return None;
        };
        ys.iter()
            .position(|y| (p.y - y).abs() <= l.row_h / 2.0)
            .map(|index| TokenSelection { side, index })
    }
}

impl<S: Surface> Widget<S> for AttentionGraph {
    type Input = GraphInput;
    type RenderData = GraphData;

    fn wrangle(&self, input: &GraphInput) -> GraphData {
        let scale = OpacityScale::new(&AxisExtents::of_matrix(&input.matrix), input.scale);
        let edges = to_edges(&input.matrix, input.threshold)
            .into_iter()
            .filter(|e| match input.selected {
                Some(TokenSelection {
                    side: Side::Left,
                    index,
                }) => e.source == index,
                Some(TokenSelection {
                    side: Side::Right,
                    index,
                }) => e.target == index,
                None => true,
            })
            .map(|edge| GraphEdge {
                opacity: scale.opacity(&edge),
                edge,
            })
            .collect();

        GraphData {
            edges,
            left: input.left.clone(),
            right: input.right.clone(),
            selected: input.selected,
        }
    }

    fn render(&mut self, mount: &mut S, data: &GraphData) {
        let size = mount.size();
        let layout = self.layout_for(size, data.left.len(), data.right.len());

        mount.clear(BG);

        for ge in &data.edges {
            let (Some(y0), Some(y1)) = (
                layout.left_y.get(ge.edge.source),
                layout.right_y.get(ge.edge.target),
            ) else {
                continue;
            };
            let width = 0.5 + 2.5 * ge.opacity as f64;
            mount.line(
                Point::new(layout.left_x, *y0),
                Point::new(layout.right_x, *y1),
                width,
                ACCENT.with_alpha(0.1 + 0.9 * ge.opacity),
            );
        }

        let columns = [
            (Side::Left, &data.left, &layout.left_y, PAD),
            (Side::Right, &data.right, &layout.right_y, layout.right_x + 6.0),
        ];
        for (side, labels, ys, x) in columns {
            for (i, (label, y)) in labels.iter().zip(ys.iter()).enumerate() {
                let color = match data.selected {
                    Some(sel) if sel.side == side && sel.index == i => HIGHLIGHT,
                    Some(_) => TEXT_DIM,
                    None => TEXT,
                };
                mount.text(Point::new(x, *y), label, color);
            }
        }
    }
}
