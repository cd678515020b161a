use serde::{Deserialize, Serialize};

/// Outcome tag carried by a build summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Success,
    Error,
}
