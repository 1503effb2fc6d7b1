pub mod digest;
mod fragment_type;
mod sparse;
mod spectrum_record;

pub use digest::{
    DigestSlice,
    DigestionParameters,
};
pub use fragment_type::FragmentType;
pub use sparse::{
    SparseMatrix,
    SparseRow,
};
pub use spectrum_record::{
    Fragmentation,
    SpectrumRecord,
};
