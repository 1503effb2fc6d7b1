use serde::{
    Deserialize,
    Serialize,
};
use std::convert::Infallible;
use std::str::FromStr;

/// Dissociation method reported by the search engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fragmentation {
    Hcd,
    Cid,
    Other(String),
}

impl Fragmentation {
    pub fn is_hcd(&self) -> bool {
        matches!(self, Fragmentation::Hcd)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Fragmentation::Hcd => "HCD",
            Fragmentation::Cid => "CID",
            Fragmentation::Other(x) => x.as_str(),
        }
    }
}

impl FromStr for Fragmentation {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.to_ascii_uppercase().as_str() {
            "HCD" => Fragmentation::Hcd,
            "CID" => Fragmentation::Cid,
            _ => Fragmentation::Other(trimmed.to_string()),
        })
    }
}

/// One peptide-spectrum match, a row of the library table.
///
/// `(raw_file, scan_number)` identifies the measured spectrum; after the
/// collision energy grid expansion the same pair shows up once per
/// candidate energy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumRecord {
    pub raw_file: String,
    pub scan_number: u32,
    pub modified_sequence: String,
    pub precursor_charge: u8,
    pub fragmentation: Fragmentation,
    pub collision_energy: f32,
    pub reverse: bool,
    pub score: f64,
    pub calculated_mass: f64,
}

impl SpectrumRecord {
    pub fn key(&self) -> (&str, u32) {
        (self.raw_file.as_str(), self.scan_number)
    }
}

#[cfg(test)]
impl SpectrumRecord {
    pub(crate) fn sample() -> Self {
        Self {
            raw_file: "run01".to_string(),
            scan_number: 1,
            modified_sequence: "PEPTIDEK".to_string(),
            precursor_charge: 2,
            fragmentation: Fragmentation::Hcd,
            collision_energy: 30.0,
            reverse: false,
            score: 100.0,
            calculated_mass: 927.4549,
        }
    }
}
