//! Per-user AHP weighting configuration. Criteria documents are stored
//! verbatim; weights are derived from the pairwise comparison matrix
//! whenever it changes, never taken off the wire.

use crate::cache::{entity, EntityCache};
use crate::error::{RealtimeError, Result};
use crate::lock::LockManager;
use crate::store::AhpConfigStore;
use std::sync::Arc;
use tickflow_types::ahp::DEFAULT_CRITERIA;
use tickflow_types::{AhpConfig, AhpConfigRequest, Response};
use uuid::Uuid;

pub struct AhpConfigService {
    configs: Arc<dyn AhpConfigStore>,
    locks: Arc<LockManager>,
    cache: Arc<dyn EntityCache>,
}

impl AhpConfigService {
    pub fn new(
        configs: Arc<dyn AhpConfigStore>,
        locks: Arc<LockManager>,
        cache: Arc<dyn EntityCache>,
    ) -> Self {
        Self {
            configs,
            locks,
            cache,
        }
    }

    pub async fn create(&self, request: &AhpConfigRequest) -> Result<Response> {
        let ahp_config_id = request
            .ahp_config_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let _guard = self.locks.acquire(&ahp_config_id).await;

        let weights_json = match &request.pairwise_matrix_json {
            Some(matrix) => Some(recalc_weights(matrix)?),
            None => None,
        };
        let config = AhpConfig {
            ahp_config_id: ahp_config_id.clone(),
            user_id: request.user_id.clone(),
            criteria_json: request
                .criteria_json
                .clone()
                .or_else(|| Some(DEFAULT_CRITERIA.to_string())),
            pairwise_matrix_json: request.pairwise_matrix_json.clone(),
            weights_json,
        };
        self.persist(config).await;
        Ok(Response::ok())
    }

    pub async fn update(&self, request: &AhpConfigRequest) -> Result<Response> {
        let ahp_config_id = request
            .ahp_config_id
            .clone()
            .ok_or_else(|| RealtimeError::BadRequest("ahpConfigId is required".to_string()))?;
        let _guard = self.locks.acquire(&ahp_config_id).await;

        let mut config = self.configs.get(&ahp_config_id).ok_or_else(|| {
            RealtimeError::NotFound(format!("AHP config not found: {ahp_config_id}"))
        })?;
        if let Some(criteria) = &request.criteria_json {
            config.criteria_json = Some(criteria.clone());
        }
        if let Some(matrix) = &request.pairwise_matrix_json {
            config.pairwise_matrix_json = Some(matrix.clone());
            config.weights_json = Some(recalc_weights(matrix)?);
        }
        self.persist(config).await;
        Ok(Response::ok())
    }

    async fn persist(&self, config: AhpConfig) {
        let ahp_config_id = config.ahp_config_id.clone();
        match serde_json::to_value(&config) {
            Ok(value) => {
                self.configs.save(config);
                self.cache
                    .put(entity::AHP_CONFIG, &ahp_config_id, &value)
                    .await;
            }
            Err(_) => self.configs.save(config),
        }
    }
}

/// Criteria weights from the pairwise comparison matrix: the geometric
/// mean of each row, normalized so the weights sum to one.
fn recalc_weights(matrix_json: &str) -> Result<String> {
    let matrix: Vec<Vec<f64>> = serde_json::from_str(matrix_json).map_err(|e| {
        RealtimeError::BadRequest(format!("pairwise matrix is not a numeric matrix: {e}"))
    })?;

    let n = matrix.len();
    if n == 0 {
        return Err(RealtimeError::BadRequest(
            "pairwise matrix is empty".to_string(),
        ));
    }
    for (i, row) in matrix.iter().enumerate() {
        if row.len() != n {
            return Err(RealtimeError::BadRequest(format!(
                "pairwise matrix must be square, row {i} has {} entries",
                row.len()
            )));
        }
    }

    let mut geo_means = Vec::with_capacity(n);
    for row in &matrix {
        let mut sum_log = 0.0;
        for &value in row {
            if value <= 0.0 {
                return Err(RealtimeError::BadRequest(format!(
                    "pairwise matrix entries must be positive, found {value}"
                )));
            }
            sum_log += value.ln();
        }
        geo_means.push((sum_log / n as f64).exp());
    }

    // Entries are all positive, so the total is too.
    let total: f64 = geo_means.iter().sum();
    let weights: Vec<f64> = geo_means.iter().map(|gm| gm / total).collect();
    serde_json::to_string(&weights).map_err(Into::into)
}
