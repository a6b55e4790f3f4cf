//! TaskPlanner: advisory strategy with a deterministic fallback

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::advisory::{AdvisoryPlanner, AdvisoryRequest};
use super::fallback::fallback_plan;
use super::task::{Plan, PlanSource, PlanningContext, Task};
use super::validate::validate;
use crate::error::PlanningError;

#[derive(Clone)]
pub struct TaskPlanner {
    advisor: Option<Arc<dyn AdvisoryPlanner>>,
    advisory_timeout: Duration,
}

impl TaskPlanner {
    /// Fallback table only
    pub fn deterministic() -> Self {
        Self {
            advisor: None,
            advisory_timeout: Duration::ZERO,
        }
    }

    pub fn with_advisor(advisor: Arc<dyn AdvisoryPlanner>, advisory_timeout: Duration) -> Self {
        Self {
            advisor: Some(advisor),
            advisory_timeout,
        }
    }

    pub fn has_advisor(&self) -> bool {
        self.advisor.is_some()
    }

    /// Produce a validated plan. Never fails: any advisory problem yields the fallback table.
    pub async fn plan(&self, ctx: &PlanningContext) -> Plan {
        if let Some(advisor) = &self.advisor {
            match self.advise(advisor.as_ref(), ctx).await {
                Ok(tasks) => {
                    debug!(game_id = ctx.game_id, tasks = tasks.len(), "advisory plan accepted");
                    return Plan {
                        game_id: ctx.game_id,
                        stage: ctx.stage,
                        source: PlanSource::Advisory,
                        tasks,
                    };
                }
                Err(e) => {
                    warn!(game_id = ctx.game_id, error = %e, "advisory plan discarded, using fallback table");
                }
            }
        }

        Plan {
            game_id: ctx.game_id,
            stage: ctx.stage,
            source: PlanSource::Fallback,
            tasks: fallback_plan(ctx),
        }
    }

    async fn advise(
        &self,
        advisor: &dyn AdvisoryPlanner,
        ctx: &PlanningContext,
    ) -> Result<Vec<Task>, PlanningError> {
        let request = AdvisoryRequest::new(ctx.clone());
        let candidates = timeout(self.advisory_timeout, advisor.propose(&request))
            .await
            .map_err(|_| PlanningError::Timeout {
                timeout_ms: self.advisory_timeout.as_millis() as u64,
            })??;
        validate(candidates, ctx)
    }
}
