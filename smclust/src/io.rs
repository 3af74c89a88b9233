use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cluster::adapter::ClusterOutcome;
use crate::cluster::partition::Partition;
use crate::error::{ClusterError, Result};

/// One item's assignment in a result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub id: usize,
    pub cluster: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub date: DateTime<Local>,
    /// Free-form algorithm parameters.
    pub parameters: Value,
    /// Algorithm specific quality metrics.
    pub performance: Value,
}

/// The persisted outcome of one clustering run,
/// `{metadata: {date, parameters, performance}, results: [{id, cluster}]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub metadata: RecordMetadata,
    pub results: Vec<ResultRow>,
}

impl From<&ClusterOutcome> for ResultRecord {
    fn from(outcome: &ClusterOutcome) -> Self {
        ResultRecord::new(&outcome.partition, outcome.parameters.clone(), outcome.performance.clone())
    }
}

impl ResultRecord {
    /// Record stamped with the current local time, one row per item in index order.
    pub fn new(partition: &Partition, parameters: Value, performance: Value) -> Self {
        let results = partition.labels()
            .iter()
            .enumerate()
            .map(|(id, cluster)| ResultRow { id, cluster: *cluster })
            .collect();
        ResultRecord {
            metadata: RecordMetadata { date: Local::now(), parameters, performance },
            results,
        }
    }

    /// Rebuilds the partition; the ids must be exactly `0..N` in any order.
    pub fn to_partition(&self) -> Result<Partition> {
        let n = self.results.len();
        let mut labels: Vec<Option<i32>> = vec![None; n];
        for row in &self.results {
            let slot = labels.get_mut(row.id).ok_or_else(|| {
                ClusterError::InputShape(format!("record of {} rows contains id {}", n, row.id))
            })?;
            if slot.replace(row.cluster).is_some() {
                return Err(ClusterError::InputShape(format!("id {} appears more than once", row.id)));
            }
        }
        // every slot is filled: n distinct ids below n
        Partition::new(labels.into_iter().flatten().collect())
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn write_staged(record: &ResultRecord, staging: &Path, path: &Path) -> Result<()> {
    {
        let mut writer = BufWriter::new(File::create(staging)?);
        serde_json::to_writer_pretty(&mut writer, record)?;
        writer.flush()?;
    }
    fs::rename(staging, path)?;
    Ok(())
}

/// Writes `record` as pretty printed JSON. The document goes to a temporary sibling first and
/// is renamed into place once complete; on failure the sibling is removed again.
pub fn save_record(record: &ResultRecord, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);

    if let Err(e) = write_staged(record, &staging, path) {
        if staging.exists() {
            if let Err(cleanup) = fs::remove_file(&staging) {
                warn!("could not remove {}: {}", staging.display(), cleanup);
            }
        }
        return Err(e);
    }

    info!("wrote clustering result with {} rows to {}", record.results.len(), path.display());
    Ok(())
}

pub fn load_record(path: impl AsRef<Path>) -> Result<ResultRecord> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> ResultRecord {
        let partition = Partition::new(vec![0, 1, 0, 2]).unwrap();
        ResultRecord::new(&partition, json!({ "k": 3 }), json!({ "silhouette_score": 0.5 }))
    }

    #[test]
    fn test_document_shape() {
        let value: Value = serde_json::from_str(&record().to_json_string().unwrap()).unwrap();
        assert!(value["metadata"]["date"].is_string());
        assert_eq!(value["metadata"]["parameters"]["k"], 3);
        assert_eq!(value["metadata"]["performance"]["silhouette_score"], 0.5);
        assert_eq!(value["results"][1], json!({ "id": 1, "cluster": 1 }));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        let original = record();
        save_record(&original, &path).unwrap();
        assert!(!dir.path().join("result.json.tmp").exists());

        let loaded = load_record(&path).unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.to_partition().unwrap().labels(), &[0, 1, 0, 2]);
    }

    #[test]
    fn test_failed_save_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        // a directory in the way makes the final rename fail
        let path = dir.path().join("taken.json");
        fs::create_dir(&path).unwrap();

        assert!(matches!(save_record(&record(), &path), Err(ClusterError::Io(_))));
        assert!(!dir.path().join("taken.json.tmp").exists());
        assert!(path.is_dir());
    }

    #[test]
    fn test_partition_from_shuffled_rows() {
        let json = r#"{
            "metadata": {"date": "2024-03-01T10:00:00+01:00", "parameters": {}, "performance": {}},
            "results": [{"id": 2, "cluster": 5}, {"id": 0, "cluster": -1}, {"id": 1, "cluster": 5}]
        }"#;
        let partition = ResultRecord::from_json_str(json).unwrap().to_partition().unwrap();
        assert_eq!(partition.labels(), &[-1, 5, 5]);
    }

    #[test]
    fn test_partition_rejects_bad_ids() {
        let mut gap = record();
        gap.results[3].id = 7;
        assert!(matches!(gap.to_partition(), Err(ClusterError::InputShape(_))));

        let mut duplicate = record();
        duplicate.results[3].id = 0;
        assert!(matches!(duplicate.to_partition(), Err(ClusterError::InputShape(_))));
    }
}
