pub mod alignment_results;
pub mod similarity;

pub use alignment_results::{
    AlignmentScore,
    SPECTRAL_ANGLE_COLUMN,
    write_alignment_scores,
};
pub use similarity::{
    DEGENERATE_SIMILARITY,
    spectral_angle,
};
