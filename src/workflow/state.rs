//! Workspace State
//!
//! The single aggregate the store owns. Views read clones of it; only
//! `WorkflowStore` operations write it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{AnalysisJob, Dataset, DatasetKind, DatasetMetadata, InsightResult, Row};
use crate::workflow::compare::ComparisonCache;

/// Step of the guided workflow, in navigation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Upload,
    Explore,
    Insights,
    Train,
    Predict,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Upload,
        Stage::Explore,
        Stage::Insights,
        Stage::Train,
        Stage::Predict,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Explore => "explore",
            Stage::Insights => "insights",
            Stage::Train => "train",
            Stage::Predict => "predict",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("unknown stage: {s}"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkspaceState {
    pub stage: Stage,
    pub active_dataset: Option<Dataset>,
    pub active_tool: Option<AnalysisJob>,
    /// True while a mutation's remote call is in flight
    pub is_processing: bool,
    pub datasets: Vec<Dataset>,

    // Derived from active_dataset
    pub preview_rows: Vec<Row>,
    pub preview_columns: Vec<String>,
    pub metadata: Option<DatasetMetadata>,

    pub compare: ComparisonCache,
    pub data_insights: Option<InsightResult>,
    pub multi_insights: Option<InsightResult>,

    /// Message of the most recently surfaced failure
    pub last_error: Option<String>,
}

impl WorkspaceState {
    pub fn datasets_of_kind(&self, kind: DatasetKind) -> Vec<&Dataset> {
        self.datasets.iter().filter(|d| d.kind == kind).collect()
    }

    pub fn is_active_dataset(&self, id: &str) -> bool {
        self.active_dataset.as_ref().is_some_and(|d| d.id == id)
    }

    pub(crate) fn clear_active_dataset(&mut self) {
        self.active_dataset = None;
        self.preview_rows.clear();
        self.preview_columns.clear();
        self.metadata = None;
        self.data_insights = None;
    }
}
