use crate::config::{
    DigestionConfig,
    Enzyme,
};
use crate::errors::ConfigError;
use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;

/// A peptide as a window on its protein sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestSlice {
    ref_seq: Arc<str>,
    range: Range<usize>,
}

impl DigestSlice {
    pub fn new(ref_seq: Arc<str>, range: Range<usize>) -> Self {
        Self { ref_seq, range }
    }

    pub fn as_str(&self) -> &str {
        &self.ref_seq[self.range.clone()]
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

impl From<DigestSlice> for String {
    fn from(x: DigestSlice) -> Self {
        x.as_str().to_string()
    }
}

/// Keeps the first occurrence of every peptide sequence.
pub fn deduplicate_digests(mut digest_slices: Vec<DigestSlice>) -> Vec<DigestSlice> {
    let mut seen: HashSet<Arc<str>> = HashSet::new();
    digest_slices.retain(|x| seen.insert(Arc::from(x.as_str())));
    digest_slices
}

#[derive(Debug, Clone, PartialEq)]
pub struct DigestionParameters {
    pub enzyme: Enzyme,
    pub min_length: usize,
    pub max_length: usize,
    pub max_missed_cleavages: usize,
}

impl TryFrom<&DigestionConfig> for DigestionParameters {
    type Error = ConfigError;

    fn try_from(config: &DigestionConfig) -> Result<Self, Self::Error> {
        config.validate()?;
        Ok(Self {
            enzyme: config.enzyme()?,
            min_length: config.min_length,
            max_length: config.max_length,
            max_missed_cleavages: config.max_missed_cleavages,
        })
    }
}

impl DigestionParameters {
    fn cleaves_after(&self, residue: u8, next: u8) -> bool {
        match self.enzyme {
            Enzyme::Trypsin => matches!(residue, b'K' | b'R') && next != b'P',
            Enzyme::TrypsinP => matches!(residue, b'K' | b'R'),
        }
    }

    /// Peptide boundaries, always starting at 0 and ending at the
    /// sequence length.
    fn cleavage_sites(&self, sequence: &[u8]) -> Vec<usize> {
        let mut sites = vec![0];
        sites.extend(
            sequence
                .windows(2)
                .enumerate()
                .filter(|(_, w)| self.cleaves_after(w[0], w[1]))
                .map(|(i, _)| i + 1),
        );
        if !sequence.is_empty() {
            sites.push(sequence.len());
        }
        sites
    }

    /// Ranges of all peptides with up to `max_missed_cleavages` internal
    /// cleavage sites and a length within `min_length..=max_length`.
    pub fn digest(&self, sequence: &str) -> Vec<Range<usize>> {
        let sites = self.cleavage_sites(sequence.as_bytes());
        let mut out = Vec::new();
        for (i, start) in sites.iter().enumerate() {
            let last = (i + 1 + self.max_missed_cleavages).min(sites.len() - 1);
            for end in sites.iter().take(last + 1).skip(i + 1) {
                let len = end - start;
                if len >= self.min_length && len <= self.max_length {
                    out.push(*start..*end);
                }
            }
        }
        out
    }

    pub fn digest_multiple(&self, sequences: &[Arc<str>]) -> Vec<DigestSlice> {
        sequences
            .iter()
            .flat_map(|seq| {
                self.digest(seq)
                    .into_iter()
                    .map(|range| DigestSlice::new(seq.clone(), range))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(max_missed_cleavages: usize) -> DigestionParameters {
        DigestionParameters {
            enzyme: Enzyme::Trypsin,
            min_length: 1,
            max_length: 50,
            max_missed_cleavages,
        }
    }

    fn peptides(params: &DigestionParameters, seq: &str) -> Vec<String> {
        params
            .digest(seq)
            .into_iter()
            .map(|r| seq[r].to_string())
            .collect()
    }

    #[test]
    fn test_tryptic_digest() {
        let seq = "MEWKLEQSMREQALLKAQLTQLK";
        assert_eq!(
            peptides(&params(0), seq),
            vec!["MEWK", "LEQSMR", "EQALLK", "AQLTQLK"]
        );
        let one_missed = peptides(&params(1), seq);
        assert_eq!(one_missed.len(), 7);
        assert!(one_missed.contains(&"MEWKLEQSMR".to_string()));
        assert!(one_missed.contains(&"EQALLKAQLTQLK".to_string()));
        assert!(!one_missed.contains(&"MEWKLEQSMREQALLK".to_string()));
    }

    #[test]
    fn test_no_cleavage_before_proline() {
        let seq = "PEPKPTIDERAAK";
        assert_eq!(peptides(&params(0), seq), vec!["PEPKPTIDER", "AAK"]);
        let trypsin_p = DigestionParameters {
            enzyme: Enzyme::TrypsinP,
            ..params(0)
        };
        assert_eq!(peptides(&trypsin_p, seq), vec!["PEPK", "PTIDER", "AAK"]);
    }

    #[test]
    fn test_length_limits() {
        let p = DigestionParameters {
            min_length: 5,
            max_length: 7,
            ..params(2)
        };
        // MEWK (4), LEQSMR (6), EQALLK (6), AQLTQLK (7)
        assert_eq!(
            peptides(&p, "MEWKLEQSMREQALLKAQLTQLK"),
            vec!["LEQSMR", "EQALLK", "AQLTQLK"]
        );
        assert!(p.digest("").is_empty());
    }

    #[test]
    fn test_deduplicate_digests() {
        let a: Arc<str> = "PEPTIDEKAAAAAAK".into();
        let b: Arc<str> = "PEPTIDEKGGGGGR".into();
        let digests = params(0).digest_multiple(&[a, b]);
        assert_eq!(digests.len(), 4);
        let deduped = deduplicate_digests(digests);
        let seqs: Vec<String> = deduped.into_iter().map(String::from).collect();
        assert_eq!(seqs, vec!["PEPTIDEK", "AAAAAAK", "GGGGGR"]);
    }

    #[test]
    fn test_from_config() {
        let config = DigestionConfig::default();
        let p = DigestionParameters::try_from(&config).unwrap();
        assert_eq!(p.enzyme, Enzyme::Trypsin);
        assert_eq!(p.max_missed_cleavages, 2);
        let bad = DigestionConfig {
            enzyme: "lysc".into(),
            ..config
        };
        assert!(DigestionParameters::try_from(&bad).is_err());
    }
}
