//! Per-user AHP weighting configuration.
//!
//! The criteria list, pairwise matrix, and weight vector are carried as
//! opaque JSON documents; the realtime service stores them verbatim and the
//! frontend interprets them.

use serde::{Deserialize, Serialize};

pub const DEFAULT_CRITERIA: &str = r#"["DDM","DCFM","RI","PB","PE","PC","PS"]"#;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AhpConfig {
    pub ahp_config_id: String,
    pub user_id: Option<String>,
    pub criteria_json: Option<String>,
    pub pairwise_matrix_json: Option<String>,
    pub weights_json: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AhpConfigRequest {
    pub ahp_config_id: Option<String>,
    pub user_id: Option<String>,
    pub criteria_json: Option<String>,
    pub pairwise_matrix_json: Option<String>,
    pub weights_json: Option<String>,
}
