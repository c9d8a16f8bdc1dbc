//! Attention tensor storage and head-level views.
//!
//! An [`AttentionModel`] keeps two views of one response: the raw weights and
//! a copy with the rows/columns of special tokens forced to zero. Both are
//! built up front so flipping [`AttentionModel::set_zeroed`] costs nothing.

use serde::Deserialize;
use thiserror::Error;

use crate::api::AttentionResponse;
use crate::tokens::{special_indexes, TokenMeta};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("attention tensor has no heads")]
    NoHeads,
    #[error("head {head} has {got} query rows, expected {expected}")]
    Rows {
        head: usize,
        expected: usize,
        got: usize,
    },
    #[error("head {head} row {row} has {got} key columns, expected {expected}")]
    Cols {
        head: usize,
        row: usize,
        expected: usize,
        got: usize,
    },
    #[error("{side} token list has {got} entries but the tensor has {expected}")]
    Tokens {
        side: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Dense row-major matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, ShapeError> {
        let n_rows = rows.len();
        let n_cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for (r, row) in rows.iter().enumerate() {
            if row.len() != n_cols {
                return Err(ShapeError::Cols {
                    head: 0,
                    row: r,
                    expected: n_cols,
                    got: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: n_rows,
            cols: n_cols,
            data,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        assert!(col < self.cols, "column {col} out of range");
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    fn row_mut(&mut self, row: usize) -> &mut [f32] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        // `chunks` rejects a zero size; a zero-column matrix still has `rows` empty rows.
        (0..self.rows).map(move |r| self.row(r))
    }

    /// Elementwise `self += other`.
    pub fn add_assign(&mut self, other: &Matrix) {
        assert_eq!(self.shape(), other.shape(), "matrix shapes differ");
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += *b;
        }
    }

    pub fn values(&self) -> &[f32] {
        &self.data
    }
}

/// `[head][query][key]` attention weights.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<Vec<Vec<f32>>>")]
pub struct AttentionTensor {
    heads: Vec<Matrix>,
    n_queries: usize,
    n_keys: usize,
}

impl AttentionTensor {
    pub fn from_nested(nested: Vec<Vec<Vec<f32>>>) -> Result<Self, ShapeError> {
        let first = nested.first().ok_or(ShapeError::NoHeads)?;
        let n_queries = first.len();
        let n_keys = first.first().map(Vec::len).unwrap_or(0);

        let mut heads = Vec::with_capacity(nested.len());
        for (h, head) in nested.iter().enumerate() {
            if head.len() != n_queries {
                return Err(ShapeError::Rows {
                    head: h,
                    expected: n_queries,
                    got: head.len(),
                });
            }
            for (r, row) in head.iter().enumerate() {
                if row.len() != n_keys {
                    return Err(ShapeError::Cols {
                        head: h,
                        row: r,
                        expected: n_keys,
                        got: row.len(),
                    });
                }
            }
            heads.push(Matrix::from_rows(head)?);
        }

        Ok(Self {
            heads,
            n_queries,
            n_keys,
        })
    }

    pub fn n_heads(&self) -> usize {
        self.heads.len()
    }

    pub fn n_queries(&self) -> usize {
        self.n_queries
    }

    pub fn n_keys(&self) -> usize {
        self.n_keys
    }

    pub fn head(&self, h: usize) -> &Matrix {
        &self.heads[h]
    }

    pub fn heads(&self) -> &[Matrix] {
        &self.heads
    }
}

impl TryFrom<Vec<Vec<Vec<f32>>>> for AttentionTensor {
    type Error = ShapeError;

    fn try_from(value: Vec<Vec<Vec<f32>>>) -> Result<Self, Self::Error> {
        Self::from_nested(value)
    }
}

/// Special-token positions for each sentence side.
///
/// Left indexes address query rows, right indexes address key columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BadTokens {
    pub left: Vec<usize>,
    pub right: Vec<usize>,
}

impl BadTokens {
    pub fn scan<S: AsRef<str>>(left: &[TokenMeta], right: &[TokenMeta], markers: &[S]) -> Self {
        Self {
            left: special_indexes(left, markers),
            right: special_indexes(right, markers),
        }
    }
}

fn zero_out(tensor: &AttentionTensor, bad: &BadTokens) -> AttentionTensor {
    let heads = tensor
        .heads
        .iter()
        .map(|head| {
            let mut out = head.clone();
            for &r in &bad.left {
                out.row_mut(r).fill(0.0);
            }
            for r in 0..out.rows {
                let row = out.row_mut(r);
                for &c in &bad.right {
                    row[c] = 0.0;
                }
            }
            out
        })
        .collect();

    AttentionTensor {
        heads,
        n_queries: tensor.n_queries,
        n_keys: tensor.n_keys,
    }
}

#[derive(Debug, Clone)]
pub struct AttentionModel {
    raw: AttentionTensor,
    zeroed_view: AttentionTensor,
    bad: BadTokens,
    zeroed: bool,
}

impl AttentionModel {
    pub fn new(tensor: AttentionTensor, bad: BadTokens, zeroed: bool) -> Self {
        let zeroed_view = zero_out(&tensor, &bad);
        Self {
            raw: tensor,
            zeroed_view,
            bad,
            zeroed,
        }
    }

    pub fn from_response<S: AsRef<str>>(
        response: &AttentionResponse,
        markers: &[S],
        zeroed: bool,
    ) -> Self {
        let bad = BadTokens::scan(&response.left, &response.right, markers);
        Self::new(response.att.clone(), bad, zeroed)
    }

    /// Replaces tensor and special-token indexes wholesale.
    pub fn update_from_response<S: AsRef<str>>(
        &mut self,
        response: &AttentionResponse,
        markers: &[S],
        zeroed: bool,
    ) {
        *self = Self::from_response(response, markers, zeroed);
    }

    pub fn zeroed(&self) -> bool {
        self.zeroed
    }

    pub fn set_zeroed(&mut self, zeroed: bool) {
        self.zeroed = zeroed;
    }

    pub fn bad_tokens(&self) -> &BadTokens {
        &self.bad
    }

    /// The view selected by [`Self::zeroed`].
    pub fn active(&self) -> &AttentionTensor {
        if self.zeroed {
            &self.zeroed_view
        } else {
            &self.raw
        }
    }

    pub fn n_heads(&self) -> usize {
        self.raw.n_heads()
    }

    pub fn by_head(&self, h: usize) -> &Matrix {
        self.active().head(h)
    }

    /// Sum of the selected heads; an empty selection yields zeros, never nothing.
    pub fn by_heads(&self, heads: &[usize]) -> Matrix {
        let view = self.active();
        let mut acc = Matrix::zeros(view.n_queries, view.n_keys);
        for &h in heads {
            acc.add_assign(view.head(h));
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor() -> AttentionTensor {
        AttentionTensor::from_nested(vec![
            vec![
                vec![0.1, 0.2, 0.7],
                vec![0.3, 0.3, 0.4],
                vec![0.5, 0.25, 0.25],
            ],
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ],
        ])
        .unwrap()
    }

    #[test]
    fn zeroed_view_clears_bad_rows_and_columns_once() {
        let t = tensor();
        let bad = BadTokens {
            left: vec![0],
            right: vec![0, 2],
        };
        let mut m = AttentionModel::new(t.clone(), bad.clone(), true);

        for h in 0..t.n_heads() {
            for r in 0..3 {
                for c in 0..3 {
                    let expected = if bad.left.contains(&r) || bad.right.contains(&c) {
                        0.0
                    } else {
                        t.head(h).get(r, c)
                    };
                    assert_eq!(m.by_head(h).get(r, c), expected, "head {h} cell ({r},{c})");
                }
            }
        }

        m.set_zeroed(false);
        assert_eq!(m.by_head(0), t.head(0));
    }

    #[test]
    fn by_heads_empty_is_zeros_of_same_shape() {
        let m = AttentionModel::new(tensor(), BadTokens::default(), false);
        let z = m.by_heads(&[]);
        assert_eq!(z.shape(), m.by_head(0).shape());
        assert!(z.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn by_heads_is_elementwise_sum() {
        let m = AttentionModel::new(tensor(), BadTokens::default(), false);
        let s = m.by_heads(&[0, 1]);
        for r in 0..3 {
            for c in 0..3 {
                let expected = m.by_head(0).get(r, c) + m.by_head(1).get(r, c);
                assert!((s.get(r, c) - expected).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn ragged_input_is_rejected() {
        let err = AttentionTensor::from_nested(vec![vec![vec![0.5, 0.5], vec![1.0]]]).unwrap_err();
        assert_eq!(
            err,
            ShapeError::Cols {
                head: 0,
                row: 1,
                expected: 2,
                got: 1
            }
        );
        assert_eq!(
            AttentionTensor::from_nested(vec![]).unwrap_err(),
            ShapeError::NoHeads
        );
    }

    #[test]
    fn update_replaces_stale_bad_indexes() {
        let first = AttentionResponse {
            att: tensor(),
            left: vec![
                TokenMeta::null_filler("[CLS]"),
                TokenMeta::null_filler("a"),
                TokenMeta::null_filler("[SEP]"),
            ],
            right: vec![
                TokenMeta::null_filler("[CLS]"),
                TokenMeta::null_filler("a"),
                TokenMeta::null_filler("[SEP]"),
            ],
        };
        let mut m = AttentionModel::from_response(&first, &["[CLS]", "[SEP]"], true);
        assert_eq!(m.bad_tokens().left, vec![0, 2]);

        let second = AttentionResponse {
            att: AttentionTensor::from_nested(vec![vec![vec![0.5, 0.5], vec![0.5, 0.5]]]).unwrap(),
            left: vec![TokenMeta::null_filler("[CLS]"), TokenMeta::null_filler("b")],
            right: vec![TokenMeta::null_filler("b"), TokenMeta::null_filler("c")],
        };
        m.update_from_response(&second, &["[CLS]", "[SEP]"], true);
        assert_eq!(m.bad_tokens().left, vec![0]);
        assert!(m.bad_tokens().right.is_empty());
        assert_eq!(m.by_head(0).row(1), &[0.5, 0.5]);
        assert_eq!(m.by_head(0).row(0), &[0.0, 0.0]);
    }
}
