//! Staged batch: the hand-off artifact between pipeline stages
//!
//! The batch is written once as line-delimited JSON into a scoped temporary
//! file, then read back by schema inference (text) and by the loader
//! (bytes). The file is removed when the `StagedBatch` is dropped, on
//! every exit path of a run.

use anyhow::{Context, Result};
use sluice_shared::types::sample::Sample;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

/// Line-delimited JSON batch backed by a temporary file.
#[derive(Debug)]
pub struct StagedBatch {
    file: NamedTempFile,
    rows: usize,
}

impl StagedBatch {
    /// Write `samples` one record per line, tagging each with `project`.
    ///
    /// The file is created in `dir` (system temp dir when `None`). Two
    /// concurrent runs never share a path.
    pub fn materialize(samples: &[Sample], project: &str, dir: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("metrics_result_").suffix(".jsonl");
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .context("Failed to create staging file")?;

        {
            let mut writer = BufWriter::new(file.as_file());
            for sample in samples {
                let mut record = sample.clone();
                record.scanned_project = project.to_string();
                serde_json::to_writer(&mut writer, &record)
                    .context("Failed to serialize sample")?;
                writer.write_all(b"\n").context("Failed to write staging file")?;
            }
            writer.flush().context("Failed to flush staging file")?;
        }

        info!(
            "Total {} rows written to {} for {}.",
            samples.len(),
            file.path().display(),
            project
        );

        Ok(Self {
            file,
            rows: samples.len(),
        })
    }

    /// Number of records in the batch.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Location of the artifact while the batch is alive.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Fresh text reader positioned at the first record.
    pub fn reader(&self) -> Result<BufReader<File>> {
        let file = self.file.reopen().context("Failed to reopen staging file")?;
        Ok(BufReader::new(file))
    }

    /// Raw payload for the loader.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        std::fs::read(self.file.path()).context("Failed to read staging file")
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::io::BufRead;

    fn sample(metric: &str, secs: i64, value: Value) -> Sample {
        let mut labels = BTreeMap::new();
        labels.insert("instance_name".to_string(), "web-1".to_string());
        Sample {
            query: "up".to_string(),
            scanned_metric: metric.to_string(),
            ts: DateTime::from_timestamp(secs, 0).unwrap(),
            value,
            scanned_project: String::new(),
            labels,
        }
    }

    #[test]
    fn test_materialize_tags_every_record() {
        let samples = vec![
            sample("M1", 1_700_000_000, json!("1.5")),
            sample("M2", 1_700_000_300, json!(2)),
        ];
        let batch = StagedBatch::materialize(&samples, "proj", None).unwrap();
        assert_eq!(batch.rows(), 2);

        let text = String::from_utf8(batch.bytes().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let record: Value = serde_json::from_str(line).unwrap();
            assert_eq!(record["scanned_project"], "proj");
        }
    }

    #[test]
    fn test_roundtrip_is_lossless() {
        let samples = vec![sample("M1", 1_700_000_000, json!("42.5"))];
        let batch = StagedBatch::materialize(&samples, "proj", None).unwrap();
        let back: Vec<Sample> = batch
            .reader()
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
            .collect();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].ts, samples[0].ts);
        assert_eq!(back[0].value, samples[0].value);
        assert_eq!(back[0].labels, samples[0].labels);
        assert_eq!(back[0].scanned_project, "proj");
    }

    #[test]
    fn test_artifact_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let batch = StagedBatch::materialize(&[], "proj", Some(dir.path())).unwrap();
        let path = batch.path().to_path_buf();
        assert!(path.exists());
        assert!(batch.is_empty());
        drop(batch);
        assert!(!path.exists());
    }

    #[test]
    fn test_reader_can_be_reopened() {
        let samples = vec![sample("M1", 1_700_000_000, json!("1"))];
        let batch = StagedBatch::materialize(&samples, "proj", None).unwrap();
        assert_eq!(batch.reader().unwrap().lines().count(), 1);
        assert_eq!(batch.reader().unwrap().lines().count(), 1);
    }
}
