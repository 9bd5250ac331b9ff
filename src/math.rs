use itertools::Itertools;

use crate::matrix::{Element, Matrix};

/// Generate the Vandermonde matrix of `degree` for observations `x`
///
/// The Vandermonde matrix is a (n x degree + 1) matrix. Each row of the matrix is a geometric
/// progression for an individual observation `x` from power `0` to `degree` inclusive.
///
/// # Examples
///
/// ```
/// use probe_calibration::math::vandermonde;
/// use probe_calibration::Matrix;
///
/// let observations: Vec<f64> = vec![2., 3.];
/// let vander = vandermonde(&observations, 2);
///
/// let expected = Matrix::from_row_major(2, 3, &[1., 2., 4., 1., 3., 9.]).unwrap();
/// assert_eq!(vander, expected);
/// ```
#[must_use]
pub fn vandermonde<E: Element>(x: &[E], degree: usize) -> Matrix<E> {
    let mut vander = Matrix::zeros(x.len(), degree + 1);
    for (ii, &xi) in x.iter().enumerate() {
        let mut power = E::one();
        for jj in 0..=degree {
            vander[(ii, jj)] = power;
            power = power * xi;
        }
    }
    vander
}

/// Indices of the first pair of exactly equal values, if any
///
/// Two observations at the same abscissa make a square Vandermonde system singular.
#[must_use]
pub fn first_repeated_pair<E: Element>(x: &[E]) -> Option<(usize, usize)> {
    (0..x.len())
        .tuple_combinations()
        .find(|&(ii, jj)| x[ii] == x[jj])
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;
    use ndarray_rand::rand::{Rng, SeedableRng};
    use rand_isaac::isaac64::Isaac64Rng;

    use super::{first_repeated_pair, vandermonde};
    use crate::linalg::inverse;
    use crate::matrix::Matrix;

    #[test]
    fn vandermonde_matrices_are_generated_correctly() {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let num_data_points = 10;
        let degree = 5;

        let data_points = (0..num_data_points)
            .map(|_| rng.gen())
            .collect::<Vec<f64>>();

        let vandermonde = vandermonde(&data_points, degree);

        for (ii, data_point) in data_points.iter().enumerate() {
            for jj in 0..=degree {
                let expected = data_point.powi(i32::try_from(jj).unwrap());
                let actual = vandermonde[(ii, jj)];
                approx::assert_relative_eq!(expected, actual, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn square_vandermonde_with_distinct_points_is_invertible() {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let dim = 4;
        let data_points = (0..dim)
            .map(|ii| f64::from(ii) + rng.gen::<f64>() * 0.5)
            .collect::<Vec<f64>>();
        assert!(data_points.iter().tuple_combinations().all(|(a, b)| a != b));

        let vander = vandermonde(&data_points, 3);
        let product = inverse(&vander).unwrap().multiply(&vander).unwrap();

        assert!(product.approx_eq(&Matrix::identity(4), 1e-9));
    }

    #[test]
    fn repeated_points_are_found() {
        assert_eq!(first_repeated_pair(&[1.0, 2.0, 3.0]), None);
        assert_eq!(first_repeated_pair(&[1.5, 1.5, 3.0]), Some((0, 1)));
        assert_eq!(first_repeated_pair(&[1.0, 2.0, 1.0]), Some((0, 2)));
        assert_eq!(first_repeated_pair::<f64>(&[]), None);
    }
}
