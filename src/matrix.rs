use std::fmt;
use std::ops::{Index, IndexMut};

use ndarray::{Array2, LinalgScalar, Zip};
use num_traits::Float;

use crate::error::MatrixError;

/// Element types the matrix kernel can operate on
///
/// In practice this is `f32` or `f64`. The bound collects what the kernel needs: real float
/// arithmetic from [`num_traits::Float`] and the [`ndarray::LinalgScalar`] bound required for
/// matrix products.
pub trait Element: Float + LinalgScalar + fmt::Debug + fmt::Display {}

impl<T: Float + LinalgScalar + fmt::Debug + fmt::Display> Element for T {}

/// A dense, row-major matrix of floating point values
///
/// The `0 x 0` matrix is the *empty* matrix. It is the [`Default`] value and is what remains in a
/// matrix after its contents are moved out with [`Matrix::take`] or after an in-place operation
/// fails. Any matrix with a zero dimension reports `not_empty() == false`.
#[derive(Clone, Debug)]
pub struct Matrix<E> {
    data: Array2<E>,
}

impl<E: Element> Default for Matrix<E> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<E: Element> From<Array2<E>> for Matrix<E> {
    fn from(data: Array2<E>) -> Self {
        Self { data }
    }
}

impl<E: Element> Matrix<E> {
    /// The empty `0 x 0` matrix
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: Array2::zeros((0, 0)),
        }
    }

    /// Allocate a `rows x columns` matrix with every element set to `value`
    ///
    /// Zero dimensions are accepted and produce an empty matrix.
    #[must_use]
    pub fn filled(rows: usize, columns: usize, value: E) -> Self {
        Self {
            data: Array2::from_elem((rows, columns), value),
        }
    }

    #[must_use]
    pub fn zeros(rows: usize, columns: usize) -> Self {
        Self::filled(rows, columns, E::zero())
    }

    #[must_use]
    pub fn identity(n: usize) -> Self {
        Self {
            data: Array2::eye(n),
        }
    }

    /// Identity for square shapes, an all-zero matrix of the requested shape otherwise
    #[must_use]
    pub fn eye(rows: usize, columns: usize) -> Self {
        if rows == columns {
            Self::identity(rows)
        } else {
            tracing::warn!(rows, columns, "identity requested for a non-square shape");
            Self::zeros(rows, columns)
        }
    }

    /// Copy `rows * columns` values laid out row by row
    ///
    /// # Errors
    /// Returns [`MatrixError::DimensionMismatch`] when `values` does not hold exactly
    /// `rows * columns` elements.
    ///
    /// # Examples
    ///
    /// ```
    /// use probe_calibration::Matrix;
    ///
    /// let m = Matrix::from_row_major(2, 2, &[1f64, 2., 3., 4.]).unwrap();
    /// assert_eq!(m[(1, 0)], 3.);
    /// ```
    pub fn from_row_major(rows: usize, columns: usize, values: &[E]) -> Result<Self, MatrixError> {
        if values.len() != rows * columns {
            return Err(MatrixError::mismatch("from_row_major", (rows, columns), (values.len(), 1)));
        }
        let data = Array2::from_shape_fn((rows, columns), |(ii, jj)| values[ii * columns + jj]);
        Ok(Self { data })
    }

    /// Build a single-column matrix
    #[must_use]
    pub fn column_vector(values: &[E]) -> Self {
        Self {
            data: Array2::from_shape_fn((values.len(), 1), |(ii, _)| values[ii]),
        }
    }

    /// Move the contents out, leaving `self` empty
    #[must_use]
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    #[must_use]
    pub fn into_inner(self) -> Array2<E> {
        self.data
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    #[must_use]
    pub fn columns(&self) -> usize {
        self.data.ncols()
    }

    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows(), self.columns())
    }

    #[must_use]
    pub fn is_square(&self) -> bool {
        self.rows() == self.columns()
    }

    /// Whether the matrix holds any storage
    ///
    /// In-place operations empty their receiver on failure, so this doubles as a success check
    /// after them.
    #[must_use]
    pub fn not_empty(&self) -> bool {
        self.rows() > 0 && self.columns() > 0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.not_empty()
    }

    /// Mutable reference to a cell
    ///
    /// # Panics
    /// Panics if `row` or `column` is out of range.
    pub fn at(&mut self, row: usize, column: usize) -> &mut E {
        &mut self.data[[row, column]]
    }

    /// Checked read of a cell
    #[must_use]
    pub fn get(&self, row: usize, column: usize) -> Option<E> {
        self.data.get((row, column)).copied()
    }

    /// The value of a `1 x 1` matrix
    ///
    /// # Errors
    /// Returns [`MatrixError::DimensionMismatch`] for any other shape.
    pub fn scalar(&self) -> Result<E, MatrixError> {
        if self.shape() == (1, 1) {
            Ok(self.data[[0, 0]])
        } else {
            Err(MatrixError::mismatch("scalar", self.shape(), (1, 1)))
        }
    }

    /// Iterate the cells in row-major order
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.data.iter()
    }

    fn check_same_shape(&self, operation: &'static str, rhs: &Self) -> Result<(), MatrixError> {
        if self.shape() == rhs.shape() {
            Ok(())
        } else {
            Err(MatrixError::mismatch(operation, self.shape(), rhs.shape()))
        }
    }

    /// Elementwise sum
    ///
    /// # Errors
    /// Returns [`MatrixError::DimensionMismatch`] unless both shapes are identical.
    pub fn add(&self, rhs: &Self) -> Result<Self, MatrixError> {
        self.check_same_shape("add", rhs)?;
        Ok(Self {
            data: Zip::from(&self.data)
                .and(&rhs.data)
                .map_collect(|&a, &b| a + b),
        })
    }

    /// Elementwise difference
    ///
    /// # Errors
    /// Returns [`MatrixError::DimensionMismatch`] unless both shapes are identical.
    pub fn subtract(&self, rhs: &Self) -> Result<Self, MatrixError> {
        self.check_same_shape("subtract", rhs)?;
        Ok(Self {
            data: Zip::from(&self.data)
                .and(&rhs.data)
                .map_collect(|&a, &b| a - b),
        })
    }

    /// In-place elementwise sum
    ///
    /// # Errors
    /// Returns [`MatrixError::DimensionMismatch`] unless both shapes are identical, in which
    /// case `self` is left empty.
    pub fn add_assign(&mut self, rhs: &Self) -> Result<(), MatrixError> {
        if let Err(e) = self.check_same_shape("add_assign", rhs) {
            *self = Self::empty();
            return Err(e);
        }
        Zip::from(&mut self.data)
            .and(&rhs.data)
            .for_each(|a, &b| *a = *a + b);
        Ok(())
    }

    /// In-place elementwise difference
    ///
    /// # Errors
    /// Returns [`MatrixError::DimensionMismatch`] unless both shapes are identical, in which
    /// case `self` is left empty.
    pub fn subtract_assign(&mut self, rhs: &Self) -> Result<(), MatrixError> {
        if let Err(e) = self.check_same_shape("subtract_assign", rhs) {
            *self = Self::empty();
            return Err(e);
        }
        Zip::from(&mut self.data)
            .and(&rhs.data)
            .for_each(|a, &b| *a = *a - b);
        Ok(())
    }

    #[must_use]
    pub fn scale(&self, factor: E) -> Self {
        Self {
            data: self.data.mapv(|x| x * factor),
        }
    }

    pub fn scale_assign(&mut self, factor: E) {
        self.data.mapv_inplace(|x| x * factor);
    }

    /// Divide every element by `divisor`
    ///
    /// Division by zero follows IEEE semantics and is not reported.
    #[must_use]
    pub fn unscale(&self, divisor: E) -> Self {
        Self {
            data: self.data.mapv(|x| x / divisor),
        }
    }

    pub fn unscale_assign(&mut self, divisor: E) {
        self.data.mapv_inplace(|x| x / divisor);
    }

    /// Matrix product `self * rhs`
    ///
    /// # Errors
    /// Returns [`MatrixError::DimensionMismatch`] when `self.columns() != rhs.rows()`.
    pub fn multiply(&self, rhs: &Self) -> Result<Self, MatrixError> {
        if self.columns() != rhs.rows() {
            return Err(MatrixError::mismatch("multiply", self.shape(), rhs.shape()));
        }
        Ok(Self {
            data: self.data.dot(&rhs.data),
        })
    }

    /// Replace `self` with `self * rhs`
    ///
    /// # Errors
    /// Returns [`MatrixError::DimensionMismatch`] when `self.columns() != rhs.rows()`, in which
    /// case `self` is left empty.
    pub fn multiply_assign(&mut self, rhs: &Self) -> Result<(), MatrixError> {
        match self.multiply(rhs) {
            Ok(product) => {
                *self = product;
                Ok(())
            }
            Err(e) => {
                *self = Self::empty();
                Err(e)
            }
        }
    }

    /// Exact elementwise comparison, no tolerance is applied
    #[must_use]
    pub fn exactly_equals(&self, other: &Self) -> bool {
        self.shape() == other.shape()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| a == b)
    }

    /// Elementwise comparison within an absolute `tolerance`
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: E) -> bool {
        self.shape() == other.shape()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(&a, &b)| (a - b).abs() <= tolerance)
    }

    /// Exchange two rows in place
    ///
    /// Nothing happens when `i == j` or when either index is out of range.
    pub fn swap_rows(&mut self, i: usize, j: usize) {
        if i == j || i >= self.rows() || j >= self.rows() {
            return;
        }
        for column in 0..self.columns() {
            self.data.swap((i, column), (j, column));
        }
    }
}

impl<E: Element> PartialEq for Matrix<E> {
    fn eq(&self, other: &Self) -> bool {
        self.exactly_equals(other)
    }
}

impl<E> Index<(usize, usize)> for Matrix<E> {
    type Output = E;

    fn index(&self, (row, column): (usize, usize)) -> &E {
        &self.data[[row, column]]
    }
}

impl<E> IndexMut<(usize, usize)> for Matrix<E> {
    fn index_mut(&mut self, (row, column): (usize, usize)) -> &mut E {
        &mut self.data[[row, column]]
    }
}

impl<E: Element> fmt::Display for Matrix<E> {
    /// One bracketed row per line. A precision, as in `{:.3}`, is applied to every element.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.data.rows() {
            write!(f, "[")?;
            for value in row {
                match f.precision() {
                    Some(precision) => write!(f, "  {value:.precision$}")?,
                    None => write!(f, "  {value}")?,
                }
            }
            writeln!(f, "  ]")?;
        }
        Ok(())
    }
}

/// The transpose of `a`, which is left untouched
#[must_use]
pub fn transpose<E: Element>(a: &Matrix<E>) -> Matrix<E> {
    Matrix {
        data: Array2::from_shape_fn((a.columns(), a.rows()), |(ii, jj)| a.data[[jj, ii]]),
    }
}
