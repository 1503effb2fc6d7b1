use serde::{
    Deserialize,
    Serialize,
};

/// Tags the matrices a [`crate::Spectra`] container can hold.
///
/// Predicted retention time and proteotypicity are stored as scalar
/// columns, not matrices, so they have no tag here.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum FragmentType {
    /// Observed (annotated) fragment intensities.
    Raw,
    /// Observed m/z of the annotated fragments.
    Mz,
    /// Predicted fragment intensities.
    Pred,
}

impl FragmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentType::Raw => "RAW",
            FragmentType::Mz => "MZ",
            FragmentType::Pred => "PRED",
        }
    }
}
