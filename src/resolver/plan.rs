use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{ConfigSchema, DecodeError};
use crate::record::CachedBackend;

/// Backend settings saved alongside a plan, so applying the plan later uses
/// exactly the backend it was created against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanBackend {
    #[serde(rename = "type")]
    pub type_name: String,
    pub config: Value,
    pub workspace: String,
}

impl CachedBackend {
    /// Settings to embed in a plan created in `workspace`.
    pub fn for_plan(&self, schema: &ConfigSchema, workspace: &str) -> Result<PlanBackend, DecodeError> {
        let value = self.config(schema)?;
        Ok(PlanBackend {
            type_name: self.type_name.clone(),
            config: value.to_raw(),
            workspace: workspace.to_string(),
        })
    }
}
