use super::{
    IonSeries,
    MAX_FRAGMENT_CHARGE,
    MAX_ION_NUMBER,
};
use crate::errors::AnnotationError;
use rustyms::fragment::FragmentType;
use rustyms::model::Location;
use rustyms::prelude::Peptidoform;
use rustyms::spectrum::MassMode;
use rustyms::system::f64::MassOverCharge;
use rustyms::system::mass_over_charge::mz;
use rustyms::system::{
    Charge,
    e,
};
use rustyms::{
    Fragment,
    LinearPeptide,
    Model,
};

/// One b or y ion of a peptide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TheoreticalFragment {
    pub series: IonSeries,
    pub ion_number: usize,
    pub charge: u8,
    pub mz: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TheoreticalPeptide {
    /// Neutral monoisotopic mass.
    pub precursor_mass: f64,
    pub fragments: Vec<TheoreticalFragment>,
}

/// Generates monoisotopic b/y fragments for ProForma sequences
/// (`[UNIMOD:1]-PEPM[UNIMOD:35]K`).
#[derive(Debug)]
pub struct FragmentMassBuilder {
    pub model: Model,
    pub max_charge: u8,
}

impl FragmentMassBuilder {
    pub fn new(tolerance_ppm: f64) -> Self {
        let by_ions = Model {
            a: (Location::None, Vec::new()),
            b: (Location::All, Vec::new()),
            c: (Location::None, Vec::new()),
            d: (Location::None, Vec::new()),
            v: (Location::None, Vec::new()),
            w: (Location::None, Vec::new()),
            x: (Location::None, Vec::new()),
            y: (Location::All, Vec::new()),
            z: (Location::None, Vec::new()),
            precursor: vec![],
            ppm: MassOverCharge::new::<mz>(tolerance_ppm),
            glycan_fragmentation: None,
        };
        Self {
            model: by_ions,
            max_charge: MAX_FRAGMENT_CHARGE,
        }
    }

    fn parse(sequence: &str) -> Result<LinearPeptide, AnnotationError> {
        let invalid = |reason: String| AnnotationError::InvalidSequence {
            sequence: sequence.to_string(),
            reason,
        };
        let peptide = Peptidoform::pro_forma(sequence, None).map_err(|e| invalid(format!("{:?}", e)))?;
        match peptide.as_linear() {
            Some(pep) => Ok(pep.clone()),
            None => Err(invalid("peptide is not linear".to_string())),
        }
    }

    /// Precursor mass plus every b/y ion up to [`MAX_ION_NUMBER`] and
    /// `max_charge`.
    pub fn theoretical_peptide(&self, sequence: &str) -> Result<TheoreticalPeptide, AnnotationError> {
        let peptide = Self::parse(sequence)?;
        let formulas = peptide.formulas();
        if formulas.len() != 1 {
            return Err(AnnotationError::InvalidSequence {
                sequence: sequence.to_string(),
                reason: format!("expected a single formula, got {}", formulas.len()),
            });
        }
        let precursor_mass = formulas[0].monoisotopic_mass().value;

        let max_charge = Charge::new::<e>(self.max_charge as f64);
        // Precursor ions come back even when the model asks for none.
        let fragments = peptide
            .generate_theoretical_fragments(max_charge, &self.model)
            .into_iter()
            .filter_map(|x| to_by_fragment(&x))
            .collect();
        Ok(TheoreticalPeptide {
            precursor_mass,
            fragments,
        })
    }
}

fn to_by_fragment(fragment: &Fragment) -> Option<TheoreticalFragment> {
    let (series, position) = match &fragment.ion {
        FragmentType::b(pos) => (IonSeries::B, pos),
        FragmentType::y(pos) => (IonSeries::Y, pos),
        _ => return None,
    };
    let ion_number = position.series_number as usize;
    let charge = fragment.charge.value.round();
    if ion_number == 0 || ion_number > MAX_ION_NUMBER || charge < 1.0 {
        return None;
    }
    Some(TheoreticalFragment {
        series,
        ion_number,
        charge: charge as u8,
        mz: fragment.mz(MassMode::Monoisotopic).value,
    })
}
