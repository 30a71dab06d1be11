//! Query sessions: analyze, optimize, run phased rounds, execute.

use std::sync::Arc;
use std::thread;

use tracing::{debug, info, instrument};

use crate::analyzer::Analyzer;
use crate::block::BlockFactory;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::exec::{DriverContext, LocalExecutionPlanner, QueryResult};
use crate::optimizer::Optimizer;
use crate::plan::{
    apply_results_from_first_phases, extract_first_phases, LogicalPlan, PhaseResult, PlanState,
};
use crate::retrieval::RetrievalService;

/// Runs queries against one retrieval service.
pub struct QuerySession {
    service: Arc<dyn RetrievalService>,
    config: EngineConfig,
    context: DriverContext,
}

impl QuerySession {
    /// Create a session with the default configuration.
    pub fn new(service: Arc<dyn RetrievalService>) -> Self {
        Self::with_config(service, EngineConfig::default())
    }

    pub fn with_config(service: Arc<dyn RetrievalService>, config: EngineConfig) -> Self {
        Self {
            service,
            config,
            context: DriverContext::new(BlockFactory::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Block accounting shared by every pipeline of this session.
    pub fn block_factory(&self) -> &BlockFactory {
        &self.context.factory
    }

    /// Stop running pipelines. Queries in flight fail with an execution
    /// error and apply no partial phase results.
    pub fn cancel(&self) {
        self.context.cancel();
    }

    /// Analyze and optimize a plan without executing it.
    pub fn prepare(&self, plan: LogicalPlan) -> Result<PlanState> {
        self.config.validate()?;
        let analyzed = Analyzer::new(self.service.as_ref(), &self.config).analyze(PlanState::new(plan))?;
        Optimizer::new().optimize(analyzed)
    }

    /// Run a plan to completion.
    ///
    /// Each round extracts the first phases of the first Phased node,
    /// executes them (a barrier: every phase completes before the round is
    /// applied), folds the results back into the plan and re-optimizes. The
    /// plan left when no Phased node remains is executed once.
    #[instrument(skip(self, plan), fields(root = plan.command_name()))]
    pub fn execute(&self, plan: LogicalPlan) -> Result<QueryResult> {
        let mut state = self.prepare(plan)?;
        let optimizer = Optimizer::new();
        let mut round = 0;

        while let Some(phase_round) = extract_first_phases(&state) {
            round += 1;
            if round > self.config.max_phase_rounds {
                return Err(Error::execution(format!(
                    "query needs more than [{}] phase rounds",
                    self.config.max_phase_rounds
                )));
            }
            let phases: Vec<LogicalPlan> = phase_round
                .phases()
                .iter()
                .map(|phase| phase.plan().clone())
                .collect();
            let results = self.execute_phases(phases)?;
            info!(
                round,
                phases = results.len(),
                rows = ?results.iter().map(PhaseResult::row_count).collect::<Vec<_>>(),
                "phase round executed"
            );
            let completed = phase_round.complete(results);
            if self.context.is_cancelled() {
                completed.discard();
                return Err(Error::execution("query cancelled"));
            }
            state = optimizer.optimize(apply_results_from_first_phases(state, completed)?)?;
        }

        debug!(rounds = round, plan = %state.plan(), "executing final plan");
        self.planner().execute(state.plan())
    }

    fn planner(&self) -> LocalExecutionPlanner {
        LocalExecutionPlanner::new(Arc::clone(&self.service), self.config.clone(), self.context.clone())
    }

    fn execute_phase(&self, plan: LogicalPlan) -> Result<PhaseResult> {
        let state = Optimizer::new().optimize(PlanState::preanalyzed(plan))?;
        Ok(self.planner().execute(state.plan())?.into_phase_result())
    }

    /// Execute every phase and wait for all of them. Any failure fails the
    /// round and releases the results of the phases that succeeded.
    fn execute_phases(&self, phases: Vec<LogicalPlan>) -> Result<Vec<PhaseResult>> {
        let results: Vec<Result<PhaseResult>> = if self.config.parallel_branches && phases.len() > 1 {
            thread::scope(|scope| {
                let handles: Vec<_> = phases
                    .into_iter()
                    .map(|phase| scope.spawn(move || self.execute_phase(phase)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                    .collect()
            })
        } else {
            phases.into_iter().map(|phase| self.execute_phase(phase)).collect()
        };
        if results.iter().any(Result::is_err) {
            let mut error = None;
            for result in results {
                match result {
                    Ok(phase) => phase.release(),
                    Err(e) => {
                        error.get_or_insert(e);
                    }
                }
            }
            return Err(error.unwrap_or_else(|| Error::execution("phase failed")));
        }
        results.into_iter().collect()
    }
}
