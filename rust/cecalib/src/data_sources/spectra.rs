use crate::errors::SpectraError;
use crate::models::{
    FragmentType,
    SparseMatrix,
    SpectrumRecord,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{
    debug,
    info,
};

const ZSTD_LEVEL: i32 = 3;

/// Columnar spectral library: one metadata row per spectrum plus any number
/// of row-aligned sparse matrices keyed by [`FragmentType`].
///
/// Row `i` of every registered matrix and scalar column belongs to row `i`
/// of the metadata table. Every registration checks this, so a container
/// that exists is always consistent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spectra {
    records: Vec<SpectrumRecord>,
    columns: BTreeMap<String, Vec<f64>>,
    matrices: BTreeMap<FragmentType, SparseMatrix>,
}

impl Spectra {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[SpectrumRecord] {
        &self.records
    }

    /// Metadata can be edited in place, rows can not be added or removed.
    pub fn records_mut(&mut self) -> &mut [SpectrumRecord] {
        &mut self.records
    }

    /// Number of rows anything already registered is aligned to.
    fn registered_rows(&self) -> Option<usize> {
        if let Some(mat) = self.matrices.values().next() {
            return Some(mat.nrows());
        }
        if let Some(col) = self.columns.values().next() {
            return Some(col.len());
        }
        if !self.records.is_empty() {
            return Some(self.records.len());
        }
        None
    }

    /// Sets the metadata table.
    ///
    /// On an empty container this adopts the rows as they are. Once rows,
    /// columns or matrices exist the new table replaces the metadata and
    /// must have the same number of rows.
    pub fn add_columns(&mut self, records: Vec<SpectrumRecord>) -> Result<(), SpectraError> {
        if let Some(expected) = self.registered_rows() {
            if expected != records.len() {
                return Err(SpectraError::RowCountMismatch {
                    expected,
                    other: records.len(),
                    context: "add_columns",
                });
            }
        }
        self.records = records;
        Ok(())
    }

    /// Registers (or replaces) a named scalar column.
    pub fn add_column(&mut self, values: Vec<f64>, name: &str) -> Result<(), SpectraError> {
        if values.len() != self.records.len() {
            return Err(SpectraError::RowCountMismatch {
                expected: self.records.len(),
                other: values.len(),
                context: "add_column",
            });
        }
        self.columns.insert(name.to_string(), values);
        Ok(())
    }

    pub fn column(&self, name: &str) -> Result<&[f64], SpectraError> {
        self.columns
            .get(name)
            .map(|x| x.as_slice())
            .ok_or_else(|| SpectraError::MissingColumn(name.to_string()))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.keys().map(|x| x.as_str())
    }

    /// Registers (or replaces) the matrix for a fragment type.
    pub fn add_matrix(
        &mut self,
        values: SparseMatrix,
        fragment_type: FragmentType,
    ) -> Result<(), SpectraError> {
        if values.nrows() != self.records.len() {
            return Err(SpectraError::RowCountMismatch {
                expected: self.records.len(),
                other: values.nrows(),
                context: "add_matrix",
            });
        }
        let width = self
            .matrices
            .iter()
            .find(|(k, _)| **k != fragment_type)
            .map(|(_, v)| v.ncols());
        if let Some(expected) = width {
            if expected != values.ncols() {
                return Err(SpectraError::ColumnWidthMismatch {
                    fragment_type,
                    expected,
                    other: values.ncols(),
                });
            }
        }
        debug!(
            "Registering {} matrix with shape {:?} and {} non-zero values",
            fragment_type.as_str(),
            values.shape(),
            values.nnz()
        );
        self.matrices.insert(fragment_type, values);
        Ok(())
    }

    pub fn get_matrix(&self, fragment_type: FragmentType) -> Result<&SparseMatrix, SpectraError> {
        self.matrices
            .get(&fragment_type)
            .ok_or(SpectraError::MissingMatrix(fragment_type))
    }

    pub fn has_matrix(&self, fragment_type: FragmentType) -> bool {
        self.matrices.contains_key(&fragment_type)
    }

    pub fn fragment_types(&self) -> impl Iterator<Item = FragmentType> + '_ {
        self.matrices.keys().copied()
    }

    /// Gathers the given rows (in order, repeats allowed) of the table, the
    /// scalar columns and every matrix into a new container.
    ///
    /// # Panics
    /// Panics if any index is out of bounds.
    pub fn select_rows(&self, rows: &[usize]) -> Spectra {
        let records = rows.iter().map(|&i| self.records[i].clone()).collect();
        let columns = self
            .columns
            .iter()
            .map(|(k, v)| (k.clone(), rows.iter().map(|&i| v[i]).collect()))
            .collect();
        let matrices = self
            .matrices
            .iter()
            .map(|(k, v)| (*k, v.select_rows(rows)))
            .collect();
        Spectra {
            records,
            columns,
            matrices,
        }
    }

    /// Encodes the table and all matrices as zstd-compressed MessagePack.
    pub fn serialize(&self) -> Result<Vec<u8>, SpectraError> {
        let packed = rmp_serde::to_vec_named(self)
            .map_err(|e| SpectraError::SerializationError(e.to_string()))?;
        zstd::encode_all(packed.as_slice(), ZSTD_LEVEL)
            .map_err(|e| SpectraError::SerializationError(e.to_string()))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, SpectraError> {
        let packed =
            zstd::decode_all(bytes).map_err(|e| SpectraError::SerializationError(e.to_string()))?;
        let out: Spectra = rmp_serde::from_slice(&packed)
            .map_err(|e| SpectraError::SerializationError(e.to_string()))?;
        out.check_consistency()?;
        Ok(out)
    }

    fn check_consistency(&self) -> Result<(), SpectraError> {
        let expected = self.records.len();
        let col_lens = self.columns.values().map(|x| x.len());
        let mat_lens = self.matrices.values().map(|x| x.nrows());
        match col_lens.chain(mat_lens).find(|&x| x != expected) {
            Some(other) => Err(SpectraError::RowCountMismatch {
                expected,
                other,
                context: "deserialize",
            }),
            None => Ok(()),
        }
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SpectraError> {
        let path = path.as_ref();
        let bytes = self.serialize()?;
        std::fs::write(path, &bytes).map_err(|e| SpectraError::FileError {
            source: e,
            path: path.to_path_buf(),
        })?;
        info!(
            "Wrote library with {} spectra ({} bytes) to {}",
            self.len(),
            bytes.len(),
            path.display()
        );
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, SpectraError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| SpectraError::FileError {
            source: e,
            path: path.to_path_buf(),
        })?;
        let out = Self::deserialize(&bytes)?;
        info!(
            "Loaded library with {} spectra from {}",
            out.len(),
            path.display()
        );
        Ok(out)
    }
}
