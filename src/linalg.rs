//! Gauss-Jordan elimination for small dense systems
//!
//! Both routines work on copies of their operands. Pivot selection is configurable through
//! [`Elimination`]. The solver defaults to the entry of largest magnitude and the inverter to the
//! entry of largest signed value.
use serde::{Deserialize, Serialize};

use crate::error::MatrixError;
use crate::matrix::{Element, Matrix};

/// Rule for choosing the pivot row among the unprocessed rows of a column
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pivoting {
    /// Partial pivoting, the row with the largest absolute value wins
    #[default]
    LargestMagnitude,
    /// The row with the largest signed value wins, ties keep the earliest row
    LargestValue,
}

/// Options for an elimination pass
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Elimination<E> {
    pub pivoting: Pivoting,
    /// A pivot whose magnitude does not exceed this value marks the system as singular
    pub tolerance: E,
}

impl<E: Element> Elimination<E> {
    /// Largest-magnitude pivoting, only an exact zero pivot is singular
    #[must_use]
    pub fn solver() -> Self {
        Self {
            pivoting: Pivoting::LargestMagnitude,
            tolerance: E::zero(),
        }
    }

    /// Largest-value pivoting, only an exact zero pivot is singular
    #[must_use]
    pub fn inverter() -> Self {
        Self {
            pivoting: Pivoting::LargestValue,
            tolerance: E::zero(),
        }
    }

    #[must_use]
    pub fn with_pivoting(mut self, pivoting: Pivoting) -> Self {
        self.pivoting = pivoting;
        self
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: E) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn rejects(&self, pivot: E) -> bool {
        pivot.is_nan() || pivot.abs() <= self.tolerance
    }
}

/// Index of the pivot row for `column`, searching rows `column..`
fn select_pivot<E: Element>(a: &Matrix<E>, column: usize, pivoting: Pivoting) -> usize {
    let mut best = column;
    for row in (column + 1)..a.rows() {
        let better = match pivoting {
            Pivoting::LargestMagnitude => a[(row, column)].abs() > a[(best, column)].abs(),
            Pivoting::LargestValue => a[(row, column)] > a[(best, column)],
        };
        if better {
            best = row;
        }
    }
    best
}

/// Solve `a * x = v` for the column vector `x`
///
/// # Errors
/// - [`MatrixError::DimensionMismatch`] if `a` is empty or not square, or `v` is not a single
///   column with as many rows as `a`
/// - [`MatrixError::Singular`] if some column has no non-zero pivot
///
/// # Examples
///
/// ```
/// use probe_calibration::linalg::solve_for;
/// use probe_calibration::Matrix;
///
/// let a = Matrix::from_row_major(2, 2, &[2f64, 1., 1., 3.]).unwrap();
/// let v = Matrix::column_vector(&[5f64, 10.]);
/// let x = solve_for(&a, &v).unwrap();
///
/// assert!((x[(0, 0)] - 1.).abs() < 1e-12);
/// assert!((x[(1, 0)] - 3.).abs() < 1e-12);
/// ```
pub fn solve_for<E: Element>(a: &Matrix<E>, v: &Matrix<E>) -> Result<Matrix<E>, MatrixError> {
    solve_for_with(a, v, &Elimination::solver())
}

/// [`solve_for`] with explicit pivoting options
///
/// # Errors
/// As [`solve_for`], with singularity judged against `options.tolerance`.
pub fn solve_for_with<E: Element>(
    a: &Matrix<E>,
    v: &Matrix<E>,
    options: &Elimination<E>,
) -> Result<Matrix<E>, MatrixError> {
    let n = a.rows();
    if a.is_empty() || !a.is_square() || v.rows() != n || v.columns() != 1 {
        return Err(MatrixError::mismatch("solve_for", a.shape(), v.shape()));
    }

    let mut a = a.clone();
    let mut v = v.clone();

    for pivot_column in 0..n {
        let best = select_pivot(&a, pivot_column, options.pivoting);
        let pivot = a[(best, pivot_column)];
        if options.rejects(pivot) {
            return Err(MatrixError::Singular {
                column: pivot_column,
            });
        }

        a.swap_rows(pivot_column, best);
        v.swap_rows(pivot_column, best);

        // Normalise the pivot row so the pivot becomes exactly one
        a[(pivot_column, pivot_column)] = E::one();
        for c in (pivot_column + 1)..n {
            a[(pivot_column, c)] = a[(pivot_column, c)] / pivot;
        }
        v[(pivot_column, 0)] = v[(pivot_column, 0)] / pivot;

        // Clear the pivot column from every other row, above and below
        for r in 0..n {
            if r == pivot_column {
                continue;
            }
            let factor = a[(r, pivot_column)];
            a[(r, pivot_column)] = E::zero();
            for c in (pivot_column + 1)..n {
                a[(r, c)] = a[(r, c)] - factor * a[(pivot_column, c)];
            }
            v[(r, 0)] = v[(r, 0)] - factor * v[(pivot_column, 0)];
        }
    }

    Ok(v)
}

/// The inverse of the square matrix `a`
///
/// # Errors
/// - [`MatrixError::DimensionMismatch`] if `a` is not square
/// - [`MatrixError::Singular`] if some column has no usable pivot
pub fn inverse<E: Element>(a: &Matrix<E>) -> Result<Matrix<E>, MatrixError> {
    inverse_with(a, &Elimination::inverter())
}

/// [`inverse`] with explicit pivoting options
///
/// # Errors
/// As [`inverse`], with singularity judged against `options.tolerance`.
pub fn inverse_with<E: Element>(
    a: &Matrix<E>,
    options: &Elimination<E>,
) -> Result<Matrix<E>, MatrixError> {
    if !a.is_square() {
        return Err(MatrixError::mismatch("inverse", a.shape(), a.shape()));
    }
    let n = a.rows();

    let mut work = a.clone();
    let mut accumulated = Matrix::identity(n);

    for ii in 0..n {
        let best = select_pivot(&work, ii, options.pivoting);
        if options.rejects(work[(best, ii)]) {
            return Err(MatrixError::Singular { column: ii });
        }
        work.swap_rows(ii, best);
        accumulated.swap_rows(ii, best);

        let pivot = work[(ii, ii)];
        for jj in 0..n {
            if jj == ii {
                continue;
            }
            let ratio = work[(jj, ii)] / pivot;
            for kk in 0..n {
                work[(jj, kk)] = work[(jj, kk)] - ratio * work[(ii, kk)];
                accumulated[(jj, kk)] = accumulated[(jj, kk)] - ratio * accumulated[(ii, kk)];
            }
        }
    }

    for ii in 0..n {
        let diagonal = work[(ii, ii)];
        for kk in 0..n {
            work[(ii, kk)] = work[(ii, kk)] / diagonal;
            accumulated[(ii, kk)] = accumulated[(ii, kk)] / diagonal;
        }
    }

    Ok(accumulated)
}
