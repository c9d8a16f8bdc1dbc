//! Reduce dense attention rows into a short list of renderable edges.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::attention::{AttentionTensor, Matrix};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub weight: f32,
}

#[inline]
fn finite_or_zero(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Strongest connections of one row until `fraction` of the row mass is covered.
///
/// Pairs are ordered by value descending, equal values by key index ascending.
/// The running total is compared against the cutoff *before* a pair is added,
/// so the pair that crosses the cutoff is still emitted, and the strongest pair
/// of a row with any mass is always emitted. Zero and non-finite cells carry no
/// mass and are never emitted. At `fraction >= 1` every positive cell is kept.
pub fn row_to_edges(source: usize, row: &[f32], fraction: f32) -> Vec<Edge> {
    let fraction = finite_or_zero(fraction).clamp(0.0, 1.0);

    let mut pairs: Vec<(f32, usize)> = row
        .iter()
        .enumerate()
        .map(|(i, v)| (finite_or_zero(*v), i))
        .collect();
    pairs.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });

    // Accumulate in the emission order so the final prefix equals the total.
    let total: f64 = pairs.iter().map(|(v, _)| f64::from(*v)).sum();
    let cutoff = f64::from(fraction) * total;
    let keep_all = fraction >= 1.0;

    let mut out = Vec::new();
    let mut running = 0.0f64;
    for (weight, target) in pairs {
        if weight <= 0.0 {
            break;
        }
        if !keep_all && !out.is_empty() && running >= cutoff {
            break;
        }
        out.push(Edge {
            source,
            target,
            weight,
        });
        running += f64::from(weight);
    }
    out
}

/// [`row_to_edges`] over every row of `matrix`, rows in source order.
pub fn to_edges(matrix: &Matrix, fraction: f32) -> Vec<Edge> {
    matrix
        .iter_rows()
        .enumerate()
        .flat_map(|(i, row)| row_to_edges(i, row, fraction))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extent {
    pub min: f32,
    pub max: f32,
}

impl Extent {
    pub const EMPTY: Extent = Extent {
        min: f32::INFINITY,
        max: f32::NEG_INFINITY,
    };

    pub fn of(values: impl IntoIterator<Item = f32>) -> Self {
        values.into_iter().fold(Self::EMPTY, |e, v| e.include(v))
    }

    pub fn include(self, v: f32) -> Self {
        if !v.is_finite() {
            return self;
        }
        Self {
            min: self.min.min(v),
            max: self.max.max(v),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn span(&self) -> f32 {
        if self.is_empty() {
            0.0
        } else {
            self.max - self.min
        }
    }
}

/// Min/max of the tensor as a whole and of each query row (across heads).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisExtents {
    pub global: Extent,
    pub per_row: Vec<Extent>,
    pub per_col: Vec<Extent>,
}

impl AxisExtents {
    pub fn of_tensor(tensor: &AttentionTensor) -> Self {
        let mut per_row = vec![Extent::EMPTY; tensor.n_queries()];
        let mut per_col = vec![Extent::EMPTY; tensor.n_keys()];
        for head in tensor.heads() {
            for (r, row) in head.iter_rows().enumerate() {
                for (c, v) in row.iter().enumerate() {
                    per_row[r] = per_row[r].include(*v);
                    per_col[c] = per_col[c].include(*v);
                }
            }
        }
        Self::finish(per_row, per_col)
    }

    pub fn of_matrix(matrix: &Matrix) -> Self {
        let per_row = matrix
            .iter_rows()
            .map(|row| Extent::of(row.iter().copied()))
            .collect();
        let mut per_col = vec![Extent::EMPTY; matrix.cols()];
        for row in matrix.iter_rows() {
            for (c, v) in row.iter().enumerate() {
                per_col[c] = per_col[c].include(*v);
            }
        }
        Self::finish(per_row, per_col)
    }

    fn finish(per_row: Vec<Extent>, per_col: Vec<Extent>) -> Self {
        let global = per_row
            .iter()
            .fold(Extent::EMPTY, |g, e| g.include(e.min).include(e.max));
        Self {
            global,
            per_row,
            per_col,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    #[default]
    Global,
    PerRow,
}

/// Linear weight → opacity map, `[0, max]` → `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct OpacityScale {
    mode: ScaleMode,
    global_max: f32,
    row_max: Vec<f32>,
}

impl OpacityScale {
    pub fn new(extents: &AxisExtents, mode: ScaleMode) -> Self {
        Self {
            mode,
            global_max: extents.global.max.max(0.0),
            row_max: extents.per_row.iter().map(|e| e.max.max(0.0)).collect(),
        }
    }

    pub fn mode(&self) -> ScaleMode {
        self.mode
    }

    pub fn opacity(&self, edge: &Edge) -> f32 {
        let max = match self.mode {
            ScaleMode::Global => self.global_max,
            ScaleMode::PerRow => self.row_max.get(edge.source).copied().unwrap_or(0.0),
        };
        if max <= 0.0 {
            0.0
        } else {
            (edge.weight / max).clamp(0.0, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(edges: &[Edge]) -> Vec<f32> {
        edges.iter().map(|e| e.weight).collect()
    }

    #[test]
    fn seventy_percent_keeps_crossing_pair() {
        let edges = row_to_edges(0, &[0.1, 0.5, 0.4], 0.7);
        assert_eq!(weights(&edges), vec![0.5, 0.4]);
        assert_eq!(
            edges.iter().map(|e| e.target).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn full_fraction_emits_every_nonzero_cell() {
        let row = [0.2, 0.0, 0.3, 0.5];
        let edges = row_to_edges(3, &row, 1.0);
        assert_eq!(edges.len(), 3);
        assert!(edges.iter().all(|e| e.source == 3 && e.weight > 0.0));
        let sum: f32 = edges.iter().map(|e| e.weight).sum();
        assert!((sum - row.iter().sum::<f32>()).abs() < 1e-6);
    }

    #[test]
    fn zero_fraction_still_emits_one_edge() {
        let edges = row_to_edges(0, &[0.1, 0.9], 0.0);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, 1);
    }

    #[test]
    fn all_zero_row_emits_nothing() {
        assert!(row_to_edges(0, &[0.0, 0.0], 0.5).is_empty());
        assert!(row_to_edges(0, &[], 1.0).is_empty());
    }

    #[test]
    fn ties_break_on_ascending_index() {
        let row = [0.25, 0.25, 0.25, 0.25];
        let a = row_to_edges(0, &row, 0.6);
        let b = row_to_edges(0, &row, 0.6);
        assert_eq!(a, b);
        assert_eq!(
            a.iter().map(|e| e.target).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn nan_cells_are_ignored() {
        let edges = row_to_edges(0, &[f32::NAN, 0.6, 0.4], 1.0);
        assert_eq!(weights(&edges), vec![0.6, 0.4]);
    }

    #[test]
    fn matrix_edges_cover_each_row() {
        let m = Matrix::from_rows(&[vec![0.9, 0.1], vec![0.2, 0.8]]).unwrap();
        let edges = to_edges(&m, 0.5);
        assert_eq!(
            edges,
            vec![
                Edge {
                    source: 0,
                    target: 0,
                    weight: 0.9
                },
                Edge {
                    source: 1,
                    target: 1,
                    weight: 0.8
                },
            ]
        );
    }

    #[test]
    fn opacity_scales_globally_or_per_row() {
        let m = Matrix::from_rows(&[vec![0.5, 0.25], vec![0.1, 0.05]]).unwrap();
        let ext = AxisExtents::of_matrix(&m);
        assert_eq!(ext.global, Extent { min: 0.05, max: 0.5 });
        assert_eq!(ext.per_col[1], Extent { min: 0.05, max: 0.25 });

        let e = Edge {
            source: 1,
            target: 0,
            weight: 0.1,
        };
        let global = OpacityScale::new(&ext, ScaleMode::Global);
        let per_row = OpacityScale::new(&ext, ScaleMode::PerRow);
        assert!((global.opacity(&e) - 0.2).abs() < 1e-6);
        assert!((per_row.opacity(&e) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_extent_has_zero_span() {
        assert!(Extent::of(std::iter::empty()).is_empty());
        assert_eq!(Extent::EMPTY.span(), 0.0);
    }
}
