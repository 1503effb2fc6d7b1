pub mod fragments;

use crate::data_sources::ObservedSpectrum;
use crate::errors::AnnotationError;
use crate::models::SpectrumRecord;
pub use fragments::{
    FragmentMassBuilder,
    TheoreticalFragment,
    TheoreticalPeptide,
};

/// Largest fragment ion number (b29/y29) with a fixed position.
pub const MAX_ION_NUMBER: usize = 29;
pub const MAX_FRAGMENT_CHARGE: u8 = 3;
/// `MAX_ION_NUMBER` ions x (y, b) x 3 charges.
pub const NUM_FRAGMENT_POSITIONS: usize = MAX_ION_NUMBER * 2 * MAX_FRAGMENT_CHARGE as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IonSeries {
    Y,
    B,
}

/// Column of a fragment in the annotated matrices.
///
/// Positions go `y1+1, y1+2, y1+3, b1+1, b1+2, b1+3, y2+1, ...`.
pub fn fragment_position(series: IonSeries, ion_number: usize, charge: u8) -> usize {
    let series_offset = match series {
        IonSeries::Y => 0,
        IonSeries::B => MAX_FRAGMENT_CHARGE as usize,
    };
    (ion_number - 1) * 2 * MAX_FRAGMENT_CHARGE as usize + series_offset + (charge as usize - 1)
}

/// Observed intensities and m/z values of one spectrum laid out on
/// the fixed fragment positions.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedSpectrum {
    pub intensities: Vec<f32>,
    pub mz: Vec<f32>,
    pub calculated_mass: f64,
}

pub trait PeakAnnotator {
    fn annotate(
        &self,
        record: &SpectrumRecord,
        observed: &ObservedSpectrum,
    ) -> Result<AnnotatedSpectrum, AnnotationError>;
}

/// Matches theoretical b/y ions to the most intense peak within a
/// relative m/z tolerance.
#[derive(Debug)]
pub struct FragmentIonAnnotator {
    pub tolerance_ppm: f64,
    builder: FragmentMassBuilder,
}

impl FragmentIonAnnotator {
    pub fn new(tolerance_ppm: f64) -> Self {
        Self {
            tolerance_ppm,
            builder: FragmentMassBuilder::new(tolerance_ppm),
        }
    }

    fn best_peak(&self, observed: &ObservedSpectrum, target_mz: f64) -> Option<f32> {
        let tol = target_mz * self.tolerance_ppm * 1e-6;
        observed
            .mz
            .iter()
            .zip(observed.intensities.iter())
            .filter(|(mz, inten)| (**mz - target_mz).abs() <= tol && **inten > 0.0)
            .map(|(_, inten)| *inten)
            .fold(None, |acc: Option<f32>, x| match acc {
                Some(best) if best >= x => Some(best),
                _ => Some(x),
            })
    }
}

impl Default for FragmentIonAnnotator {
    fn default() -> Self {
        Self::new(20.0)
    }
}

impl PeakAnnotator for FragmentIonAnnotator {
    fn annotate(
        &self,
        record: &SpectrumRecord,
        observed: &ObservedSpectrum,
    ) -> Result<AnnotatedSpectrum, AnnotationError> {
        let peptide = self.builder.theoretical_peptide(&record.modified_sequence)?;
        let mut intensities = vec![0.0f32; NUM_FRAGMENT_POSITIONS];
        let mut mz = vec![0.0f32; NUM_FRAGMENT_POSITIONS];

        let max_charge = record.precursor_charge.min(MAX_FRAGMENT_CHARGE);
        for frag in peptide.fragments.iter().filter(|x| x.charge <= max_charge) {
            if let Some(inten) = self.best_peak(observed, frag.mz) {
                let pos = fragment_position(frag.series, frag.ion_number, frag.charge);
                intensities[pos] = inten;
                mz[pos] = frag.mz as f32;
            }
        }

        let max = intensities.iter().cloned().fold(0.0f32, f32::max);
        if max > 0.0 {
            intensities.iter_mut().for_each(|x| *x /= max);
        }

        Ok(AnnotatedSpectrum {
            intensities,
            mz,
            calculated_mass: peptide.precursor_mass,
        })
    }
}
