use crate::error::MatrixError;
use crate::linalg::{solve_for_with, Elimination};
use crate::math::vandermonde;
use crate::matrix::{Element, Matrix};

/// A polynomial in ascending powers, `c0 + c1 x + c2 x^2 + ...`
#[derive(Clone, Debug, PartialEq)]
pub struct Polynomial<E> {
    coefficients: Vec<E>,
}

impl<E: Element> Polynomial<E> {
    #[must_use]
    pub fn new(coefficients: Vec<E>) -> Self {
        Self { coefficients }
    }

    /// Read the coefficients from a single-column matrix
    ///
    /// # Errors
    /// Returns [`MatrixError::DimensionMismatch`] if `column` is not a non-empty column vector.
    pub fn from_column(column: &Matrix<E>) -> Result<Self, MatrixError> {
        if column.columns() != 1 || column.rows() == 0 {
            return Err(MatrixError::mismatch(
                "polynomial from column",
                column.shape(),
                (column.rows(), 1),
            ));
        }
        Ok(Self {
            coefficients: column.iter().copied().collect(),
        })
    }

    #[must_use]
    pub fn coefficients(&self) -> &[E] {
        &self.coefficients
    }

    #[must_use]
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Evaluate at `x` by Horner's scheme, the zero polynomial for no coefficients
    #[must_use]
    pub fn evaluate(&self, x: E) -> E {
        self.coefficients
            .iter()
            .rev()
            .fold(E::zero(), |acc, &c| acc * x + c)
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.coefficients.iter().all(|c| c.is_finite())
    }
}

/// Fit the unique polynomial of degree `x.len() - 1` passing through every `(x, y)` pair
///
/// The square Vandermonde system is solved directly, so the polynomial interpolates the points
/// rather than approximating them.
///
/// # Errors
/// - [`MatrixError::DimensionMismatch`] if `x` is empty or `x` and `y` differ in length
/// - [`MatrixError::Singular`] if the system has no unique solution, as happens when two `x`
///   values coincide
///
/// # Examples
///
/// ```
/// use probe_calibration::linalg::Elimination;
/// use probe_calibration::polyfit::fit_exact;
///
/// let fit = fit_exact(&[1f64, 2., 3.], &[1., 4., 9.], &Elimination::solver()).unwrap();
/// assert!((fit.evaluate(4.) - 16.).abs() < 1e-9);
/// ```
pub fn fit_exact<E: Element>(
    x: &[E],
    y: &[E],
    elimination: &Elimination<E>,
) -> Result<Polynomial<E>, MatrixError> {
    if x.is_empty() || x.len() != y.len() {
        return Err(MatrixError::mismatch("fit_exact", (x.len(), 1), (y.len(), 1)));
    }

    let vander = vandermonde(x, x.len() - 1);
    let target = Matrix::column_vector(y);
    let solution = solve_for_with(&vander, &target, elimination)?;

    Polynomial::from_column(&solution)
}

#[cfg(test)]
mod tests {
    use ndarray_rand::rand::{Rng, SeedableRng};
    use proptest::prelude::*;
    use rand_isaac::Isaac64Rng;

    use super::{fit_exact, Polynomial};
    use crate::error::MatrixError;
    use crate::linalg::Elimination;

    #[test]
    fn horner_evaluation_matches_power_sum() {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let coefficients = (0..5).map(|_| rng.gen()).collect::<Vec<f64>>();
        let polynomial = Polynomial::new(coefficients.clone());
        let x: f64 = rng.gen_range(-3.0..3.0);

        let expected: f64 = coefficients
            .iter()
            .enumerate()
            .map(|(ii, ci)| ci * x.powi(i32::try_from(ii).unwrap()))
            .sum();

        approx::assert_relative_eq!(polynomial.evaluate(x), expected, max_relative = 1e-12);
        assert_eq!(polynomial.degree(), 4);
    }

    #[test]
    fn empty_polynomial_evaluates_to_zero() {
        assert_eq!(Polynomial::<f64>::new(vec![]).evaluate(3.0), 0.0);
    }

    #[test]
    fn squares_are_fit_by_a_pure_quadratic() {
        let fit = fit_exact(&[1.0, 2.0, 3.0], &[1.0, 4.0, 9.0], &Elimination::solver()).unwrap();

        let expected = [0.0, 0.0, 1.0];
        for (calculated, expected) in fit.coefficients().iter().zip(expected) {
            approx::assert_abs_diff_eq!(*calculated, expected, epsilon = 1e-12);
        }
        approx::assert_relative_eq!(fit.evaluate(4.0), 16.0, max_relative = 1e-12);
    }

    #[test]
    fn two_points_give_a_line() {
        let fit = fit_exact(&[1500.0, 2032.44], &[7.0, 4.0], &Elimination::solver()).unwrap();

        assert_eq!(fit.degree(), 1);
        approx::assert_relative_eq!(fit.evaluate(1500.0), 7.0, max_relative = 1e-10);
        approx::assert_relative_eq!(fit.evaluate(2032.44), 4.0, max_relative = 1e-10);
    }

    #[test]
    fn repeated_abscissae_are_singular() {
        let result = fit_exact(&[1.5, 1.5, 3.0], &[4.0, 7.0, 10.0], &Elimination::solver());
        assert!(matches!(result, Err(MatrixError::Singular { .. })));
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        assert!(fit_exact(&[1.0, 2.0], &[1.0], &Elimination::solver()).is_err());
        assert!(fit_exact::<f64>(&[], &[], &Elimination::solver()).is_err());
    }

    proptest! {
        #[test]
        fn fit_matches_input_coefficients(
            coefficients in proptest::collection::vec(-5.0..5.0f64, 3),
            start in -10.0..10.0f64,
            spacing in proptest::collection::vec(0.5..3.0f64, 2),
        ) {
            let x = vec![start, start + spacing[0], start + spacing[0] + spacing[1]];
            let generator = Polynomial::new(coefficients.clone());
            let y = x.iter().map(|&xi| generator.evaluate(xi)).collect::<Vec<_>>();

            let fit = fit_exact(&x, &y, &Elimination::solver()).unwrap();

            for (calculated, expected) in fit.coefficients().iter().zip(&coefficients) {
                prop_assert!((calculated - expected).abs() < 1e-6);
            }
        }
    }
}
