// Stage reachability
// Evaluated fresh from the state on every query; holds nothing of its own

use crate::models::JobStatus;
use crate::workflow::state::{Stage, WorkspaceState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageAvailability {
    pub upload: bool,
    pub explore: bool,
    pub insights: bool,
    pub train: bool,
    pub predict: bool,
}

impl StageAvailability {
    pub fn allows(&self, stage: Stage) -> bool {
        match stage {
            Stage::Upload => self.upload,
            Stage::Explore => self.explore,
            Stage::Insights => self.insights,
            Stage::Train => self.train,
            Stage::Predict => self.predict,
        }
    }

    /// Reachable stages in workflow order
    pub fn stages(&self) -> Vec<Stage> {
        Stage::ALL.into_iter().filter(|s| self.allows(*s)).collect()
    }
}

pub fn reachable(state: &WorkspaceState) -> StageAvailability {
    let tool = state.active_tool.as_ref();
    StageAvailability {
        upload: true,
        explore: state.active_dataset.is_some(),
        insights: tool.is_some(),
        train: tool.is_some_and(|t| t.analysis.is_some()),
        predict: tool.is_some_and(|t| t.status == JobStatus::Trained),
    }
}
