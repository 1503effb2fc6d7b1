use crate::errors::DataProcessingError;
use crate::models::{
    SparseMatrix,
    SparseRow,
};
use std::f64::consts::PI;

/// Similarity reported for a row where either spectrum has no signal,
/// counted as a total mismatch.
pub const DEGENERATE_SIMILARITY: f32 = 0.0;

/// Calculates the cosine similarity between two sparse rows.
///
/// Returns `None` if either row has zero magnitude.
pub fn cosine_similarity(a: &SparseRow<'_>, b: &SparseRow<'_>) -> Option<f64> {
    let magnitude_a = a.norm();
    let magnitude_b = b.norm();
    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return None;
    }
    let out = a.dot(b) / (magnitude_a * magnitude_b);
    // Rounding can push identical vectors a hair past 1.0
    Some(out.clamp(-1.0, 1.0))
}

/// Spectral angle similarity of a single pair of rows, in [0, 1].
pub fn spectral_angle_row(predicted: &SparseRow<'_>, observed: &SparseRow<'_>) -> f32 {
    match cosine_similarity(predicted, observed) {
        Some(cos) => {
            let out = 1.0 - (2.0 * cos.acos() / PI);
            out.clamp(0.0, 1.0) as f32
        }
        None => DEGENERATE_SIMILARITY,
    }
}

/// Row-wise spectral angle similarity between predicted and observed intensities.
///
/// Both matrices must have the same shape. Identical (or proportional)
/// rows score 1.0, orthogonal rows score 0.0 and rows where either side
/// is all zero score [`DEGENERATE_SIMILARITY`].
///
/// Example:
/// ```
/// use cecalib::models::SparseMatrix;
/// use cecalib::scoring::spectral_angle;
///
/// let pred = SparseMatrix::from_dense_rows(&[vec![1.0, 2.0, 0.0]], 3).unwrap();
/// let obs = SparseMatrix::from_dense_rows(&[vec![2.0, 4.0, 0.0]], 3).unwrap();
/// let out = spectral_angle(&pred, &obs).unwrap();
/// assert!((out[0] - 1.0).abs() < 1e-6);
/// ```
pub fn spectral_angle(
    predicted: &SparseMatrix,
    observed: &SparseMatrix,
) -> Result<Vec<f32>, DataProcessingError> {
    if predicted.shape() != observed.shape() {
        return Err(DataProcessingError::ExpectedSameShape {
            expected: predicted.shape(),
            other: observed.shape(),
            context: "spectral_angle".to_string(),
        });
    }

    Ok(predicted
        .rows()
        .zip(observed.rows())
        .map(|(p, r)| spectral_angle_row(&p, &r))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mat(rows: &[Vec<f32>]) -> SparseMatrix {
        SparseMatrix::from_dense_rows(rows, rows[0].len()).unwrap()
    }

    #[test]
    fn test_identical_and_proportional_rows() {
        let pred = mat(&[vec![0.1, 0.5, 0.0, 1.0], vec![3.0, 0.0, 1.0, 0.0]]);
        let obs = mat(&[vec![0.1, 0.5, 0.0, 1.0], vec![30.0, 0.0, 10.0, 0.0]]);
        let out = spectral_angle(&pred, &obs).unwrap();
        assert_eq!(out.len(), 2);
        for x in out {
            assert!((x - 1.0).abs() < 1e-6, "{}", x);
        }
    }

    #[test]
    fn test_orthogonal_rows() {
        let pred = mat(&[vec![1.0, 0.0, 2.0, 0.0]]);
        let obs = mat(&[vec![0.0, 5.0, 0.0, 1.0]]);
        let out = spectral_angle(&pred, &obs).unwrap();
        assert!(out[0].abs() < 1e-6);
    }

    #[test]
    fn test_all_zero_rows_use_sentinel() {
        let pred = mat(&[vec![0.0, 0.0, 0.0], vec![1.0, 1.0, 0.0], vec![0.0, 0.0, 0.0]]);
        let obs = mat(&[vec![1.0, 0.0, 0.0], vec![0.0, 0.0, 0.0], vec![0.0, 0.0, 0.0]]);
        let out = spectral_angle(&pred, &obs).unwrap();
        assert_eq!(out, vec![DEGENERATE_SIMILARITY; 3]);
        assert!(out.iter().all(|x| !x.is_nan()));
    }

    #[test]
    fn test_output_is_bounded() {
        let pred = mat(&[
            vec![0.3, 0.9, 0.0, 0.01, 1.0],
            vec![1.0, 0.0, 0.0, 0.0, 0.0],
            vec![1e-8, 1e8, 3.0, 0.0, 0.5],
        ]);
        let obs = mat(&[
            vec![0.9, 0.1, 0.4, 0.0, 0.2],
            vec![1.0, 1.0, 1.0, 1.0, 1.0],
            vec![1e8, 1e-8, 0.0, 2.0, 0.0],
        ]);
        let out = spectral_angle(&pred, &obs).unwrap();
        for x in out {
            assert!((0.0..=1.0).contains(&x), "{}", x);
        }
    }

    #[test]
    fn test_known_angle() {
        // 45 degrees apart -> 1 - 2 * (pi / 4) / pi = 0.5
        let pred = mat(&[vec![1.0, 0.0]]);
        let obs = mat(&[vec![1.0, 1.0]]);
        let out = spectral_angle(&pred, &obs).unwrap();
        assert!((out[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_shape_mismatch() {
        let pred = mat(&[vec![1.0, 0.0]]);
        let obs = mat(&[vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert!(spectral_angle(&pred, &obs).is_err());
    }

    #[test]
    fn test_inputs_untouched() {
        let pred = mat(&[vec![1.0, 2.0]]);
        let obs = mat(&[vec![2.0, 1.0]]);
        let (p2, o2) = (pred.clone(), obs.clone());
        let _ = spectral_angle(&pred, &obs).unwrap();
        assert_eq!(pred, p2);
        assert_eq!(obs, o2);
    }
}
