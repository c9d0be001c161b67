use crate::models::{ItemId, UserId};
use crate::services::model::MfModel;

/// Pointwise prediction for a (user, item) pair.
///
/// Returns `None` when either id is unknown to the model (cold start).
/// `global_mean + user_bias + item_bias + <p_u, q_i>`, plus the user's
/// mean rating when the model was trained on centered targets.
pub fn predict(model: &MfModel, user_id: UserId, item_id: ItemId) -> Option<f64> {
    let u = model.user_index(user_id)?;
    let i = model.item_index(item_id)?;
    Some(predict_indexed(model, u, i))
}

/// Prediction by dense index; callers guarantee the indices are in range
pub(crate) fn predict_indexed(model: &MfModel, u: usize, i: usize) -> f64 {
    let base = model.global_mean
        + model.user_bias[u]
        + model.item_bias[i]
        + model.user_factors.row(u).dot(&model.item_factors.row(i));

    match (&model.user_mean, model.center_user) {
        (Some(mean), true) => base + mean[u],
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::model::IdIndex;
    use ndarray::array;

    fn model(center_user: bool) -> MfModel {
        MfModel::new(
            array![[1.0, 2.0]],
            array![[0.5, 0.25], [0.0, 0.0]],
            array![0.5],
            array![-0.25, 1.0],
            3.0,
            Some(array![1.5]),
            center_user,
            IdIndex::from_unsorted(vec![10]),
            IdIndex::from_unsorted(vec![100, 200]),
        )
        .unwrap()
    }

    #[test]
    fn test_predict_known_pair() {
        // 3.0 + 0.5 - 0.25 + (0.5 + 0.5)
        let score = predict(&model(false), 10, 100).unwrap();
        assert!((score - 4.25).abs() < 1e-12);
    }

    #[test]
    fn test_predict_adds_user_mean_when_centered() {
        let score = predict(&model(true), 10, 100).unwrap();
        assert!((score - 5.75).abs() < 1e-12);
    }

    #[test]
    fn test_predict_cold_start_is_none() {
        let m = model(false);
        assert_eq!(predict(&m, 99, 100), None);
        assert_eq!(predict(&m, 10, 999), None);
    }
}
