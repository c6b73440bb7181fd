use serde::{Deserialize, Serialize};

/// A single step transition reported by the backend.
///
/// Serialized as `{ "updateType": "started", "stepId": "..." }`. Any
/// `updateType` this build does not know decodes to [`OperationUpdate::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "updateType", rename_all = "snake_case")]
pub enum OperationUpdate {
    Started {
        #[serde(rename = "stepId")]
        step_id: String,
    },
    Finished {
        #[serde(rename = "stepId")]
        step_id: String,
    },
    Failed {
        #[serde(rename = "stepId")]
        step_id: String,
        /// Free-form diagnostic text, often a multi-line report.
        #[serde(rename = "extraDetails", default)]
        extra_details: String,
    },
    #[serde(other)]
    Unknown,
}

impl OperationUpdate {
    pub fn started(step_id: impl Into<String>) -> Self {
        Self::Started {
            step_id: step_id.into(),
        }
    }

    pub fn finished(step_id: impl Into<String>) -> Self {
        Self::Finished {
            step_id: step_id.into(),
        }
    }

    pub fn failed(step_id: impl Into<String>, extra_details: impl Into<String>) -> Self {
        Self::Failed {
            step_id: step_id.into(),
            extra_details: extra_details.into(),
        }
    }

    pub fn step_id(&self) -> Option<&str> {
        match self {
            Self::Started { step_id } | Self::Finished { step_id } | Self::Failed { step_id, .. } => {
                Some(step_id)
            }
            Self::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Finished { .. } => "finished",
            Self::Failed { .. } => "failed",
            Self::Unknown => "unknown",
        }
    }
}

/// A recorded step failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct StepFailure {
    pub step_id: String,
    pub extra_details: String,
}
