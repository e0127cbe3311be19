//! Labelled applicant sample used for training, evaluation, SHAP background
//! rows and the exploratory endpoint.

pub mod analysis;
pub mod synthetic;

use crate::pipeline::config::DatasetConfig;
use crate::pipeline::encoder::{EncodeError, FeatureSchema};
use crate::validation::{ValidationErrors, validate_applicant};
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use shared::ApplicantRecord;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Failed to access dataset {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed dataset row at line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
    #[error("Row at line {line} is out of domain: {source}")]
    InvalidRow {
        line: usize,
        source: ValidationErrors,
    },
    #[error("Row at line {line} has risk {risk}, expected 0 or 1")]
    InvalidLabel { line: usize, risk: u8 },
    #[error("Dataset is empty")]
    Empty,
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// One applicant with its observed outcome; `risk` is 1 for a good payer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledApplicant {
    #[serde(flatten)]
    pub record: ApplicantRecord,
    pub risk: u8,
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub rows: Vec<LabeledApplicant>,
}

impl Dataset {
    pub fn load_or_synthesize(config: &DatasetConfig) -> Result<Self, DatasetError> {
        if config.path.exists() {
            let dataset = Self::load_jsonl(&config.path)?;
            log::info!("Loaded {} rows from {}", dataset.len(), config.path.display());
            Ok(dataset)
        } else {
            log::info!(
                "No sample at {}, synthesising {} rows (seed {})",
                config.path.display(),
                config.synthetic_rows,
                config.seed
            );
            Ok(synthetic::synthesize(config.synthetic_rows, config.seed))
        }
    }

    pub fn load_jsonl(path: &Path) -> Result<Self, DatasetError> {
        let io_err = |source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = std::fs::File::open(path).map_err(io_err)?;
        let mut rows = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() {
                continue;
            }
            let value: serde_json::Value = serde_json::from_str(&line)
                .map_err(|source| DatasetError::Parse { line: idx + 1, source })?;
            validate_applicant(&value)
                .map_err(|source| DatasetError::InvalidRow { line: idx + 1, source })?;
            let row: LabeledApplicant = serde_json::from_value(value)
                .map_err(|source| DatasetError::Parse { line: idx + 1, source })?;
            if row.risk > 1 {
                return Err(DatasetError::InvalidLabel {
                    line: idx + 1,
                    risk: row.risk,
                });
            }
            rows.push(row);
        }
        if rows.is_empty() {
            return Err(DatasetError::Empty);
        }
        Ok(Self { rows })
    }

    pub fn save_jsonl(&self, path: &Path) -> Result<(), DatasetError> {
        let io_err = |source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut writer = BufWriter::new(std::fs::File::create(path).map_err(io_err)?);
        for row in &self.rows {
            let line = serde_json::to_string(row)
                .map_err(|source| DatasetError::Parse { line: 0, source })?;
            writeln!(writer, "{}", line).map_err(io_err)?;
        }
        writer.flush().map_err(io_err)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Shuffled train/test row indices. The test side gets
    /// `round(n * test_fraction)` rows, at least one when `n > 1`.
    pub fn split(&self, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
        let n = self.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));

        let mut n_test = (n as f64 * test_fraction.clamp(0.0, 1.0)).round() as usize;
        if n > 1 {
            n_test = n_test.clamp(1, n - 1);
        }
        let train = order.split_off(n_test.min(n));
        (train, order)
    }

    /// Encoded feature matrix and labels for the given rows.
    pub fn encode(
        &self,
        schema: &FeatureSchema,
        rows: &[usize],
    ) -> Result<(Array2<f64>, Vec<u8>), DatasetError> {
        let mut x = Array2::zeros((rows.len(), schema.width()));
        let mut y = Vec::with_capacity(rows.len());
        for (i, &row) in rows.iter().enumerate() {
            let sample = &self.rows[row];
            x.row_mut(i).assign(&schema.encode(&sample.record)?);
            y.push(sample.risk);
        }
        Ok((x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encoder::CURRENT_SCHEMA;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir().join(format!("credit-sample-{}.jsonl", uuid::Uuid::new_v4()))
    }

    #[test]
    fn split_is_disjoint_and_reproducible() {
        let dataset = synthetic::synthesize(50, 1);
        let (train, test) = dataset.split(0.2, 42);
        assert_eq!(test.len(), 10);
        assert_eq!(train.len(), 40);
        assert!(test.iter().all(|i| !train.contains(i)));
        assert_eq!(dataset.split(0.2, 42), (train, test));
    }

    #[test]
    fn jsonl_round_trip_through_a_file() {
        let dataset = synthetic::synthesize(5, 3);
        let path = scratch_path();
        dataset.save_jsonl(&path).unwrap();
        let loaded = Dataset::load_jsonl(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.rows, dataset.rows);
    }

    #[test]
    fn rejects_labels_outside_zero_and_one() {
        let mut row = serde_json::to_value(&synthetic::synthesize(1, 3).rows[0]).unwrap();
        row["risk"] = serde_json::json!(2);
        let path = scratch_path();
        std::fs::write(&path, format!("{}\n", row)).unwrap();
        let err = Dataset::load_jsonl(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, DatasetError::InvalidLabel { line: 1, risk: 2 }));
    }

    #[test]
    fn rejects_rows_outside_the_applicant_domain() {
        let mut row = serde_json::to_value(&synthetic::synthesize(1, 3).rows[0]).unwrap();
        row["age"] = serde_json::json!(150);
        row["credit_history"] = serde_json::json!(9);
        let good = serde_json::to_value(&synthetic::synthesize(1, 4).rows[0]).unwrap();
        let path = scratch_path();
        std::fs::write(&path, format!("{}\n{}\n", good, row)).unwrap();
        let err = Dataset::load_jsonl(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        match err {
            DatasetError::InvalidRow { line, source } => {
                assert_eq!(line, 2);
                assert!(source.fields.contains_key("age"));
                assert!(source.fields.contains_key("credit_history"));
            }
            other => panic!("expected an out-of-domain row, got {}", other),
        }
    }

    #[test]
    fn encodes_selected_rows() {
        let dataset = synthetic::synthesize(8, 2);
        let (x, y) = dataset.encode(&CURRENT_SCHEMA, &[3, 5]).unwrap();
        assert_eq!(x.dim(), (2, CURRENT_SCHEMA.width()));
        assert_eq!(y, vec![dataset.rows[3].risk, dataset.rows[5].risk]);
    }
}
