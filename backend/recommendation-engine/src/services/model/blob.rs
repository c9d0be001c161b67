// Persisted model blob.
//
// Older blobs carry neither `user_mean` nor `center_user`; both
// deserialize as absent and the model is treated as uncentered.

use super::{IdIndex, MfModel, ModelError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Model file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model file decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Model file is inconsistent: {0}")]
    Invalid(#[from] ModelError),
}

impl BlobError {
    pub fn is_missing(&self) -> bool {
        matches!(self, BlobError::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBlob {
    pub user_factors: Vec<Vec<f64>>,
    pub item_factors: Vec<Vec<f64>>,
    pub user_bias: Vec<f64>,
    pub item_bias: Vec<f64>,
    pub global_mean: f64,
    pub user_ids: Vec<i64>,
    pub item_ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_mean: Option<Vec<f64>>,
    #[serde(default)]
    pub center_user: bool,
}

impl From<&MfModel> for ModelBlob {
    fn from(model: &MfModel) -> Self {
        Self {
            user_factors: rows(&model.user_factors),
            item_factors: rows(&model.item_factors),
            user_bias: model.user_bias.to_vec(),
            item_bias: model.item_bias.to_vec(),
            global_mean: model.global_mean,
            user_ids: model.users.ids().to_vec(),
            item_ids: model.items.ids().to_vec(),
            user_mean: model.user_mean.as_ref().map(|m| m.to_vec()),
            center_user: model.center_user,
        }
    }
}

impl TryFrom<ModelBlob> for MfModel {
    type Error = ModelError;

    fn try_from(blob: ModelBlob) -> Result<Self, Self::Error> {
        let user_factors = matrix(blob.user_factors, "user_factors")?;
        let item_factors = matrix(blob.item_factors, "item_factors")?;

        MfModel::new(
            user_factors,
            item_factors,
            Array1::from(blob.user_bias),
            Array1::from(blob.item_bias),
            blob.global_mean,
            blob.user_mean.map(Array1::from),
            blob.center_user,
            IdIndex::from_ids(blob.user_ids)?,
            IdIndex::from_ids(blob.item_ids)?,
        )
    }
}

fn rows(m: &Array2<f64>) -> Vec<Vec<f64>> {
    m.outer_iter().map(|row| row.to_vec()).collect()
}

fn matrix(rows: Vec<Vec<f64>>, name: &str) -> Result<Array2<f64>, ModelError> {
    let nrows = rows.len();
    let ncols = rows.first().map_or(0, |r| r.len());
    if rows.iter().any(|r| r.len() != ncols) {
        return Err(ModelError::ShapeMismatch(format!("{} has ragged rows", name)));
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((nrows, ncols), flat)
        .map_err(|e| ModelError::ShapeMismatch(format!("{}: {}", name, e)))
}

/// Write the model next to `path` and rename it into place
pub fn save_model<P: AsRef<Path>>(model: &MfModel, path: P) -> Result<(), BlobError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let data = serde_json::to_vec(&ModelBlob::from(model))?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)?;

    info!(
        path = %path.display(),
        users = model.num_users(),
        items = model.num_items(),
        "Model blob written"
    );

    Ok(())
}

pub fn load_model<P: AsRef<Path>>(path: P) -> Result<MfModel, BlobError> {
    let path = path.as_ref();
    let data = fs::read(path)?;
    let blob: ModelBlob = serde_json::from_slice(&data)?;
    let model = MfModel::try_from(blob)?;

    debug!(
        path = %path.display(),
        users = model.num_users(),
        items = model.num_items(),
        center_user = model.center_user,
        "Model blob loaded"
    );

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample_model(center_user: bool) -> MfModel {
        MfModel::new(
            array![[0.1, -0.2], [0.3, 0.05]],
            array![[0.5, 0.5], [-0.1, 0.2], [0.0, 1.0]],
            array![0.2, -0.1],
            array![0.0, 0.3, -0.3],
            3.5,
            center_user.then(|| array![1.0, 2.0]),
            center_user,
            IdIndex::from_unsorted(vec![11, 12]),
            IdIndex::from_unsorted(vec![1, 2, 3]),
        )
        .unwrap()
    }

    #[test]
    fn test_save_and_load_preserves_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mf_model.json");
        let model = sample_model(true);

        save_model(&model, &path).unwrap();
        let loaded = load_model(&path).unwrap();

        assert_eq!(loaded, model);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_legacy_blob_without_centering_fields() {
        let json = r#"{
            "user_factors": [[0.1, 0.2]],
            "item_factors": [[0.3, 0.4]],
            "user_bias": [0.0],
            "item_bias": [0.0],
            "global_mean": 4.0,
            "user_ids": [7],
            "item_ids": [9]
        }"#;
        let blob: ModelBlob = serde_json::from_str(json).unwrap();
        let model = MfModel::try_from(blob).unwrap();

        assert!(!model.center_user);
        assert!(model.user_mean.is_none());
    }

    #[test]
    fn test_missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_model(dir.path().join("absent.json")).unwrap_err();
        assert!(missing.is_missing());

        let corrupt_path = dir.path().join("corrupt.json");
        fs::write(&corrupt_path, b"{not json").unwrap();
        let corrupt = load_model(&corrupt_path).unwrap_err();
        assert!(!corrupt.is_missing());
        assert!(matches!(corrupt, BlobError::Decode(_)));
    }

    #[test]
    fn test_ragged_factors_rejected() {
        let blob = ModelBlob {
            user_factors: vec![vec![0.1, 0.2], vec![0.3]],
            item_factors: vec![vec![0.1, 0.2]],
            user_bias: vec![0.0, 0.0],
            item_bias: vec![0.0],
            global_mean: 0.0,
            user_ids: vec![1, 2],
            item_ids: vec![3],
            user_mean: None,
            center_user: false,
        };
        assert!(matches!(
            MfModel::try_from(blob),
            Err(ModelError::ShapeMismatch(_))
        ));
    }
}
