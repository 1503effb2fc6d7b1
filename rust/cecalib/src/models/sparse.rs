use crate::errors::DataProcessingError;
use serde::{
    Deserialize,
    Serialize,
};

/// Row-compressed sparse matrix of fragment values.
///
/// Each row holds one spectrum, each column a fixed fragment position.
/// Zeros are never stored, so an unobserved fragment and an observed
/// zero intensity are the same thing.
///
/// Note on memory layout:
///
/// `indptr[i]..indptr[i + 1]` is the range of `indices` and `values`
/// that belongs to row `i`. Indices within a row are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseMatrix {
    ncols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
    values: Vec<f32>,
}

/// Borrowed view over a single row.
#[derive(Debug, Clone, Copy)]
pub struct SparseRow<'a> {
    pub indices: &'a [u32],
    pub values: &'a [f32],
}

impl SparseRow<'_> {
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|&x| x == 0.0)
    }

    pub fn dot(&self, other: &SparseRow<'_>) -> f64 {
        let mut i = 0;
        let mut j = 0;
        let mut out = 0.0f64;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    out += self.values[i] as f64 * other.values[j] as f64;
                    i += 1;
                    j += 1;
                }
            }
        }
        out
    }

    pub fn norm(&self) -> f64 {
        self.values
            .iter()
            .map(|&x| (x as f64) * (x as f64))
            .sum::<f64>()
            .sqrt()
    }
}

impl SparseMatrix {
    pub fn empty(ncols: usize) -> Self {
        Self {
            ncols,
            indptr: vec![0],
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Builds a matrix from dense rows, dropping zeros.
    ///
    /// Every row has to be exactly `ncols` wide.
    ///
    /// Example:
    /// ```
    /// use cecalib::models::SparseMatrix;
    /// let mat = SparseMatrix::from_dense_rows(&[vec![0.0, 1.0], vec![2.0, 0.0]], 2).unwrap();
    /// assert_eq!(mat.nrows(), 2);
    /// assert_eq!(mat.nnz(), 2);
    /// assert_eq!(mat.row_dense(1), vec![2.0, 0.0]);
    /// ```
    pub fn from_dense_rows<R: AsRef<[f32]>>(
        rows: &[R],
        ncols: usize,
    ) -> Result<Self, DataProcessingError> {
        let mut out = Self::empty(ncols);
        out.indptr.reserve(rows.len());
        for (ri, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != ncols {
                return Err(DataProcessingError::ExpectedRowWidth {
                    expected: ncols,
                    other: row.len(),
                    row: ri,
                });
            }
            for (ci, &val) in row.iter().enumerate() {
                // NaN and negative values mark "not a fragment" in some predictors.
                if val > 0.0 {
                    out.indices.push(ci as u32);
                    out.values.push(val);
                }
            }
            out.indptr.push(out.indices.len());
        }
        Ok(out)
    }

    pub fn nrows(&self) -> usize {
        self.indptr.len() - 1
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows(), self.ncols)
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn row(&self, i: usize) -> SparseRow<'_> {
        let range = self.indptr[i]..self.indptr[i + 1];
        SparseRow {
            indices: &self.indices[range.clone()],
            values: &self.values[range],
        }
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = SparseRow<'_>> + '_ {
        (0..self.nrows()).map(|i| self.row(i))
    }

    pub fn row_dense(&self, i: usize) -> Vec<f32> {
        let mut out = vec![0.0; self.ncols];
        let row = self.row(i);
        for (&ci, &val) in row.indices.iter().zip(row.values.iter()) {
            out[ci as usize] = val;
        }
        out
    }

    /// Gathers the given rows, in order, into a new matrix.
    /// Rows may repeat.
    ///
    /// # Panics
    /// Panics if any index is out of bounds.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let mut out = Self::empty(self.ncols);
        out.indptr.reserve(rows.len());
        for &ri in rows {
            let row = self.row(ri);
            out.indices.extend_from_slice(row.indices);
            out.values.extend_from_slice(row.values);
            out.indptr.push(out.indices.len());
        }
        out
    }
}
