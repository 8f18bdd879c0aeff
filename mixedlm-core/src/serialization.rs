//! Fit summary serialization and deserialization.
//!
//! Uses bincode for the compact binary `.lmm.fit` file; the magic bytes
//! (LMMF) and version travel inside the payload.
//! Optional JSON sidecar for human inspection.

use anyhow::{bail, Result};
use std::path::Path;

use crate::report::FitSummary;

/// Save a fit summary to a binary file (.lmm.fit).
pub fn save_summary(summary: &FitSummary, path: &Path) -> Result<()> {
    let encoded = bincode::serialize(summary)?;
    std::fs::write(path, &encoded)?;
    Ok(())
}

/// Load a fit summary from a binary file (.lmm.fit).
pub fn load_summary(path: &Path) -> Result<FitSummary> {
    let data = std::fs::read(path)?;
    let summary: FitSummary = bincode::deserialize(&data)?;

    if summary.magic != FitSummary::MAGIC {
        bail!(
            "Invalid fit file: expected magic bytes {:?}, got {:?}",
            FitSummary::MAGIC,
            summary.magic
        );
    }
    if summary.version > FitSummary::VERSION {
        bail!(
            "Fit file version {} is newer than supported version {}",
            summary.version,
            FitSummary::VERSION
        );
    }

    Ok(summary)
}

/// Save a JSON sidecar (.lmm.fit.json).
pub fn save_summary_json(summary: &FitSummary, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Criterion, VarianceComponents};

    fn summary() -> FitSummary {
        FitSummary {
            magic: FitSummary::MAGIC,
            version: FitSummary::VERSION,
            kind: "vector-term".into(),
            criterion: Criterion::MaximumLikelihood,
            objective: 1751.0,
            deviance: Some(1931.0),
            log_likelihood: Some(-965.5),
            aic: Some(1943.0),
            bic: Some(1962.2),
            theta: vec![0.97, 0.015, 0.23],
            variance_components: VarianceComponents::Vector {
                covariance: vec![vec![565.5, 11.1], vec![11.1, 32.7]],
                residual: 654.9,
            },
            grplevels: vec![18],
            fixef: vec![251.4, 10.5],
            stderr: vec![6.6, 1.5],
            n: 180,
            p: 2,
            q: 36,
            t: 1,
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.lmm.fit");

        save_summary(&summary(), &path).unwrap();
        let loaded = load_summary(&path).unwrap();

        assert_eq!(loaded.n, 180);
        assert_eq!(loaded.grplevels, vec![18]);
        assert_eq!(loaded.theta, vec![0.97, 0.015, 0.23]);
        assert_eq!(loaded.variance_components, summary().variance_components);
        assert_eq!(loaded.criterion, Criterion::MaximumLikelihood);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.lmm.fit");
        let mut s = summary();
        s.magic = *b"SGMD";
        save_summary(&s, &path).unwrap();
        let err = load_summary(&path).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_json_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.lmm.fit.json");
        save_summary_json(&summary(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let back: FitSummary = serde_json::from_str(&text).unwrap();
        assert_eq!(back.fixef, vec![251.4, 10.5]);
    }
}
