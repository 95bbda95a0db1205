//! Numeric kernels shared by the propagation operators, loss and diagnostics.
//!
//! - Vector primitives: `dot`, `squared_norm`, `euclidean`
//! - Row-major conversion to and from `DenseMatrix`
//! - Sparse (CSR) × dense and dense × dense products, parallel over rows
//! - `PropagationOperator`: one application of a square node operator to a
//!   node-indexed embedding table

use rayon::prelude::*;
use smartcore::linalg::basic::arrays::{Array, Array2};
use smartcore::linalg::basic::matrix::DenseMatrix;
use sprs::CsMat;

/// A square operator over graph nodes that can be applied to an
/// `nnodes × d` embedding table.
pub trait PropagationOperator: Sync {
    fn nnodes(&self) -> usize;

    /// `X ↦ Op · X`
    fn apply(&self, x: &DenseMatrix<f64>) -> DenseMatrix<f64>;
}

#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
pub fn squared_norm(a: &[f64]) -> f64 {
    a.iter().map(|&x| x * x).sum::<f64>()
}

#[inline]
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Copy of row `i`.
pub fn row(m: &DenseMatrix<f64>, i: usize) -> Vec<f64> {
    let (_, ncols) = m.shape();
    (0..ncols).map(|j| *m.get((i, j))).collect()
}

/// Flatten into a row-major buffer.
pub fn to_row_major(m: &DenseMatrix<f64>) -> Vec<f64> {
    let (nrows, ncols) = m.shape();
    let mut out = Vec::with_capacity(nrows * ncols);
    for i in 0..nrows {
        for j in 0..ncols {
            out.push(*m.get((i, j)));
        }
    }
    out
}

pub fn from_row_major(data: Vec<f64>, nrows: usize, ncols: usize) -> DenseMatrix<f64> {
    debug_assert_eq!(data.len(), nrows * ncols);
    DenseMatrix::from_iterator(data.into_iter(), nrows, ncols, 0)
}

/// `A · X` for CSR `A` (n × n) and dense `X` (n × d).
pub fn sparse_dense_mul(a: &CsMat<f64>, x: &DenseMatrix<f64>) -> DenseMatrix<f64> {
    let (n, d) = x.shape();
    assert_eq!(a.cols(), n, "operator has {} columns, table has {} rows", a.cols(), n);
    let xs = to_row_major(x);

    let out: Vec<f64> = (0..a.rows())
        .into_par_iter()
        .flat_map_iter(|i| {
            let mut acc = vec![0.0; d];
            if let Some(r) = a.outer_view(i) {
                for (j, &w) in r.iter() {
                    let src = &xs[j * d..(j + 1) * d];
                    for (o, s) in acc.iter_mut().zip(src.iter()) {
                        *o += w * s;
                    }
                }
            }
            acc.into_iter()
        })
        .collect();

    from_row_major(out, a.rows(), d)
}

/// `A · X` for row-major dense `A` (m × n) and dense `X` (n × d).
pub fn dense_mul(a: &[f64], m: usize, x: &DenseMatrix<f64>) -> DenseMatrix<f64> {
    let (n, d) = x.shape();
    assert_eq!(a.len(), m * n, "operator buffer does not match {}x{}", m, n);
    let xs = to_row_major(x);

    let out: Vec<f64> = (0..m)
        .into_par_iter()
        .flat_map_iter(|i| {
            let a_row = &a[i * n..(i + 1) * n];
            let mut acc = vec![0.0; d];
            for (k, &w) in a_row.iter().enumerate() {
                if w == 0.0 {
                    continue;
                }
                let src = &xs[k * d..(k + 1) * d];
                for (o, s) in acc.iter_mut().zip(src.iter()) {
                    *o += w * s;
                }
            }
            acc.into_iter()
        })
        .collect();

    from_row_major(out, m, d)
}

/// `acc += scale · m`, elementwise.
pub fn add_scaled(acc: &mut [f64], m: &DenseMatrix<f64>, scale: f64) {
    let (nrows, ncols) = m.shape();
    debug_assert_eq!(acc.len(), nrows * ncols);
    for i in 0..nrows {
        for j in 0..ncols {
            acc[i * ncols + j] += scale * m.get((i, j));
        }
    }
}

/// Stack `top` over `bottom` (same column count).
pub fn vstack(top: &DenseMatrix<f64>, bottom: &DenseMatrix<f64>) -> DenseMatrix<f64> {
    let (rt, ct) = top.shape();
    let (rb, cb) = bottom.shape();
    assert_eq!(ct, cb, "cannot stack {} and {} columns", ct, cb);
    let mut data = to_row_major(top);
    data.extend(to_row_major(bottom));
    from_row_major(data, rt + rb, ct)
}

/// Split rows `[0, at)` and `[at, nrows)`.
pub fn split_rows(m: &DenseMatrix<f64>, at: usize) -> (DenseMatrix<f64>, DenseMatrix<f64>) {
    let (nrows, ncols) = m.shape();
    assert!(at <= nrows, "split index {} beyond {} rows", at, nrows);
    let mut data = to_row_major(m);
    let tail = data.split_off(at * ncols);
    (
        from_row_major(data, at, ncols),
        from_row_major(tail, nrows - at, ncols),
    )
}

/// Mean of the given rows.
pub fn centroid(rows: &[&[f64]]) -> Vec<f64> {
    let d = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut c = vec![0.0; d];
    for r in rows {
        for (ci, v) in c.iter_mut().zip(r.iter()) {
            *ci += v;
        }
    }
    let n = rows.len().max(1) as f64;
    c.iter_mut().for_each(|v| *v /= n);
    c
}
