pub mod fasta;
pub mod peptide_list;
pub mod raw;
pub mod search_results;
pub mod spectra;

pub use raw::ObservedSpectrum;
pub use spectra::Spectra;
