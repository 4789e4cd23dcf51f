//! Top-level entry point binding the scheduling, gate, audit, search, and
//! storage layers into `run_query(query, config) -> QueryResponse`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::agent::{Agent, AgentRegistry, AgentView};
use crate::audit::AuditLoop;
use crate::circuit_breaker::{CircuitBreakerRegistry, Outcome};
use crate::claim::{AuditStatus, Claim, ClaimKind};
use crate::config::{ConfigSource, ReasoningMode, RuntimeConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::gate::{GateBranch, GatePolicy, ScoutSignals};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::query_state::{Message, QueryState, RecordedError};
use crate::reasoning::{self, ReActStep};
use crate::search::SearchEngine;
use crate::storage::{ClaimPatch, ClaimStore};
use crate::task_graph::{Planner, TaskGraph};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    pub backend: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub answer: Option<String>,
    pub reasoning: Vec<String>,
    pub citations: Vec<Citation>,
    pub confidence: f32,
    pub claims: Vec<Claim>,
    pub audit_table: Vec<(String, String)>,
    pub metrics: MetricsSnapshot,
    pub errors: Vec<RecordedError>,
    pub loops_used: u32,
    pub agents_executed: Vec<String>,
    pub agent_groups: Vec<String>,
    /// The ReAct trace (thought/action/observation) accumulated across every
    /// dispatched group, in completion order.
    pub react_trace: Vec<ReActStep>,
    /// GraphML 1.2 rendering of the final claim graph.
    pub knowledge_graph_graphml: String,
    /// JSON rendering of the final claim graph, same node/edge set as
    /// `knowledge_graph_graphml`.
    pub knowledge_graph_json: String,
}

/// One group's execution result: owned data, no borrow on `QueryState`, so
/// several can be constructed as independent futures and joined with
/// `futures::future::join_all` without aliasing the state they'll merge into.
#[derive(Default)]
struct GroupOutcome {
    claims: Vec<Claim>,
    messages: Vec<Message>,
    react_steps: Vec<ReActStep>,
    agents_executed: Vec<String>,
    error_records: Vec<(ErrorKind, String, String)>,
    retries: u64,
}

/// Binds the agent registry, search engine, and claim store for one
/// orchestrator instance. Multiple instances can run concurrently — there is
/// no process-wide mutable singleton.
pub struct Orchestrator {
    registry: AgentRegistry,
    search: SearchEngine,
    store: Arc<ClaimStore>,
    config_source: Option<Arc<dyn ConfigSource>>,
}

impl Orchestrator {
    pub fn new(registry: AgentRegistry, search: SearchEngine, store: Arc<ClaimStore>) -> Self {
        Self {
            registry,
            search,
            store,
            config_source: None,
        }
    }

    /// Attaches a hot-reload source; each loop boundary samples it fresh
    /// instead of mutating a shared config in place.
    pub fn with_config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.config_source = Some(source);
        self
    }

    #[instrument(skip(self, config), fields(query = %query))]
    pub async fn run_query(&self, query: &str, config: &RuntimeConfig) -> Result<QueryResponse> {
        if !matches!(
            config.reasoning_mode,
            ReasoningMode::Direct | ReasoningMode::Dialectical | ReasoningMode::ChainOfThought
        ) {
            // Unreachable today since `ReasoningMode` is a closed enum, but
            // documents scenario S5's "fails before any agent runs" contract
            // for a host that widens the mode set upstream of this core.
            return Err(Error::ReasoningModeError(format!("{:?}", config.reasoning_mode)));
        }
        config.validate()?;

        let metrics = Metrics::new();
        let mut state = QueryState::new(query, config.primus_start, metrics.clone());
        let breakers = CircuitBreakerRegistry::new(
            config.circuit_breaker_threshold,
            config.circuit_breaker_cooldown_ms,
        );

        let prior_claims: Vec<Claim> = self.store.resident_claims();
        let agent_roles = self.effective_agents(config);
        let graph: TaskGraph = Planner::plan(query, &prior_claims, &agent_roles);
        state.task_graph = Some(graph);

        let mut agents_executed = Vec::new();
        let mut agent_group_labels = Vec::new();

        // Scout pass: a single cheap Synthesizer invocation.
        let scout_agents = self.registry.resolve(&["Synthesizer".to_string()]);
        let scout_signals = if let Some(scout) = scout_agents.first() {
            let claims_snapshot: Vec<Claim> = state.claims().cloned().collect();
            let outcome = self
                .run_group(
                    vec![scout.clone()],
                    claims_snapshot,
                    state.query.clone(),
                    state.loop_index,
                    config,
                    &breakers,
                )
                .await;
            self.apply_group_outcome(&mut state, outcome, &mut agents_executed);
            self.scout_signals(&state)
        } else {
            ScoutSignals {
                retrieval_overlap: 0.0,
                conflict_score: 0.0,
                complexity: 1.0,
            }
        };
        agent_group_labels.push("Synthesizer".to_string());

        let gate = GatePolicy::new(config.gate.clone());
        // `ReasoningMode::Direct` is an explicit single-pass configuration,
        // not a heuristic outcome, so it forces the gate's branch rather
        // than feeding it through the overlap/conflict/complexity rule.
        let operator_override = matches!(config.reasoning_mode, ReasoningMode::Direct)
            .then_some(GateBranch::DirectAnswer);
        let decision = gate.decide(scout_signals, config.loops, operator_override);
        metrics.record_gate_decision(decision);
        info!(branch = ?decision.branch, loops = decision.loops, "gate decision");

        if decision.branch != GateBranch::DirectAnswer {
            let groups = self.agent_groups(config);
            let query_deadline = Duration::from_millis(config.query_timeout_ms);
            let completed = tokio::time::timeout(query_deadline, async {
                for _loop_idx in 0..decision.loops {
                    let loop_config = match &self.config_source {
                        Some(source) => source.current().await.unwrap_or_else(|_| config.clone()),
                        None => config.clone(),
                    };
                    let order = rotate(&groups, state.primus_index % groups.len().max(1));
                    let claims_snapshot: Vec<Claim> = state.claims().cloned().collect();

                    let mut dispatched = Vec::new();
                    for group_names in &order {
                        let agents = self.registry.resolve(group_names);
                        if agents.is_empty() {
                            continue;
                        }
                        let skip_all = group_names.iter().all(|name| breakers.is_open(name));
                        if skip_all {
                            warn!(group = ?group_names, "skipping group: circuit open");
                            continue;
                        }
                        agent_group_labels.push(group_names.join(", "));
                        dispatched.push(self.run_group(
                            agents,
                            claims_snapshot.clone(),
                            state.query.clone(),
                            state.loop_index,
                            &loop_config,
                            &breakers,
                        ));
                    }

                    let outcomes = join_all(dispatched).await;
                    for outcome in outcomes {
                        self.apply_group_outcome(&mut state, outcome, &mut agents_executed);
                    }

                    state.primus_index = (state.primus_index + 1) % agent_roles.len().max(1);
                    state.loop_index += 1;
                    breakers.tick_all(Instant::now());
                }
            })
            .await;
            if completed.is_err() {
                state.record_error(
                    ErrorKind::Timeout,
                    "Orchestrator",
                    format!("query exceeded query_timeout_ms ({})", config.query_timeout_ms),
                );
            }
        }

        // Persist newly produced claims so the audit loop's per-outcome
        // `update_claim` has a resident row to patch.
        let produced_claims: Vec<Claim> = state.claims().cloned().collect();
        for claim in produced_claims {
            if let Err(err) = self.store.persist_claim(claim, false) {
                state.record_error(ErrorKind::Critical, "ClaimStore", err.to_string());
            }
        }

        // Audit loop.
        let audit_claims: Vec<Claim> = state.claims().cloned().collect();
        let audit = AuditLoop::new(config.audit.clone(), &self.search, config.search.clone(), &metrics);
        match audit.run(&audit_claims).await {
            Ok(outcomes) => {
                for outcome in outcomes {
                    if let Some(claim) = state.claim_mut(outcome.claim_id) {
                        claim.audit_status = outcome.new_status;
                    }
                    let patch = ClaimPatch {
                        audit_status: Some(outcome.new_status),
                        ..Default::default()
                    };
                    if let Err(err) = self.store.update_claim(outcome.claim_id, patch, true) {
                        state.record_error(err.kind(), "ClaimStore", err.to_string());
                    }
                }
            }
            Err(err) => {
                state.record_error(err.kind(), "AuditLoop", err.to_string());
            }
        }

        Ok(self.format_response(state, agents_executed, agent_group_labels, decision.loops))
    }

    fn effective_agents(&self, config: &RuntimeConfig) -> Vec<String> {
        match config.reasoning_mode {
            ReasoningMode::Direct => vec!["Synthesizer".to_string()],
            _ => config.agents.clone(),
        }
    }

    fn agent_groups(&self, config: &RuntimeConfig) -> Vec<Vec<String>> {
        if let Some(groups) = &config.agent_groups {
            return groups.clone();
        }
        self.effective_agents(config)
            .into_iter()
            .map(|name| vec![name])
            .collect()
    }

    /// Folds one group's owned result into `state`, which is only ever
    /// mutated here — agents themselves never touch `QueryState` directly.
    fn apply_group_outcome(
        &self,
        state: &mut QueryState,
        outcome: GroupOutcome,
        agents_executed: &mut Vec<String>,
    ) {
        state.merge_claims(outcome.claims);
        for message in outcome.messages {
            state.messages.push(message);
        }
        for step in outcome.react_steps {
            state.react_log.push(step);
        }
        for (kind, component, message) in outcome.error_records {
            state.record_error(kind, component, message);
        }
        for _ in 0..outcome.retries {
            state.metrics.record_retry();
        }
        agents_executed.extend(outcome.agents_executed);
    }

    /// Runs one group's agents sequentially in declaration order, retrying
    /// transient failures up to `max_retries` under a `model_timeout_ms`
    /// deadline per attempt, stopping the group early once it has recorded
    /// `max_errors` failures. The group itself is one of potentially several
    /// dispatched in parallel by the caller via separate `run_group` futures
    /// joined together.
    async fn run_group(
        &self,
        agents: Vec<Arc<dyn Agent>>,
        claims_snapshot: Vec<Claim>,
        query: String,
        loop_index: u32,
        config: &RuntimeConfig,
        breakers: &CircuitBreakerRegistry,
    ) -> GroupOutcome {
        let mut outcome = GroupOutcome::default();
        let mut local_claims = claims_snapshot;

        for agent in &agents {
            if outcome.error_records.len() as u32 >= config.max_errors {
                break;
            }

            outcome
                .react_steps
                .push(ReActStep::thought(format!("dispatching {}", agent.role())));

            let mut attempt = 0u32;
            let result = loop {
                let claims: Vec<&Claim> = local_claims.iter().collect();
                let view = AgentView {
                    query: &query,
                    loop_index,
                    claims,
                };
                let call = agent.execute(view, config);
                let attempt_result = match tokio::time::timeout(
                    Duration::from_millis(config.model_timeout_ms),
                    call,
                )
                .await
                {
                    Ok(inner) => inner,
                    Err(_) => Err(Error::timeout(config.model_timeout_ms)),
                };
                match &attempt_result {
                    Ok(_) => break attempt_result,
                    Err(err) if err.kind() == ErrorKind::Transient && attempt < config.max_retries => {
                        outcome.retries += 1;
                        attempt += 1;
                        continue;
                    }
                    Err(_) => break attempt_result,
                }
            };

            match result {
                Ok(delta) => {
                    breakers.record(agent.role(), Outcome::Success, Instant::now());
                    outcome.react_steps.push(ReActStep::action(
                        agent.role(),
                        format!("produced {} claim(s)", delta.claims.len()),
                    ));
                    local_claims.extend(delta.claims.clone());
                    outcome.claims.extend(delta.claims);
                    outcome.messages.extend(delta.messages);
                    outcome.agents_executed.push(agent.role().to_string());
                }
                Err(err) => {
                    let kind = err.kind();
                    breakers.record(agent.role(), Outcome::Failure(kind), Instant::now());
                    outcome
                        .react_steps
                        .push(ReActStep::observation(agent.role(), err.to_string(), None));
                    outcome.error_records.push((kind, agent.role().to_string(), err.to_string()));
                    debug!(agent = agent.role(), error = %err, "agent execution failed");
                }
            }
        }

        outcome
    }

    fn scout_signals(&self, state: &QueryState) -> ScoutSignals {
        let claims: Vec<&Claim> = state.claims().collect();
        if claims.is_empty() {
            return ScoutSignals {
                retrieval_overlap: 0.0,
                conflict_score: 0.0,
                complexity: 1.0,
            };
        }
        let sourced = claims.iter().filter(|c| !c.sources.is_empty()).count();
        let overlap = sourced as f64 / claims.len() as f64;
        let conflicts = claims
            .iter()
            .map(|c| c.relation_targets(crate::claim::RelationKind::Contradicts).len())
            .sum::<usize>() as f64;
        let complexity = (state.query.split_whitespace().count() as f64 / 40.0).min(1.0);
        ScoutSignals {
            retrieval_overlap: overlap,
            conflict_score: conflicts,
            complexity,
        }
    }

    fn format_response(
        &self,
        state: QueryState,
        agents_executed: Vec<String>,
        agent_groups: Vec<String>,
        loops_used: u32,
    ) -> QueryResponse {
        let claims: Vec<Claim> = state.claims().cloned().collect();
        let best = claims
            .iter()
            .filter(|c| c.kind == ClaimKind::Synthesis && c.audit_status != AuditStatus::Unsupported)
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal));

        let answer = best.map(|c| c.text.clone());
        let confidence = best.map(|c| c.confidence).unwrap_or(0.0);
        let citations = best
            .map(|c| {
                c.sources
                    .iter()
                    .map(|s| Citation {
                        url: s.url.clone(),
                        backend: s.backend.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let audit_table = claims
            .iter()
            .map(|c| (c.id.to_string(), format!("{:?}", c.audit_status)))
            .collect();
        let reasoning: Vec<String> = state.messages.iter().map(|m: &Message| m.content.clone()).collect();
        let knowledge_graph_graphml = reasoning::to_graphml(&claims);
        let knowledge_graph_json = reasoning::to_json(&claims).unwrap_or_default();

        QueryResponse {
            query: state.query.clone(),
            answer,
            reasoning,
            citations,
            confidence,
            claims,
            audit_table,
            metrics: state.metrics.snapshot(),
            errors: state.errors.clone(),
            loops_used,
            agents_executed,
            agent_groups,
            react_trace: state.react_log.steps.clone(),
            knowledge_graph_graphml,
            knowledge_graph_json,
        }
    }
}

/// Rotates `groups` so the group at `primus_index` opens the loop.
fn rotate<T: Clone>(groups: &[T], primus_index: usize) -> Vec<T> {
    if groups.is_empty() {
        return Vec::new();
    }
    let idx = primus_index % groups.len();
    groups[idx..].iter().chain(groups[..idx].iter()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::default_registry;
    use crate::config::StorageConfig;
    use crate::metrics::Metrics as CoreMetrics;

    fn orchestrator() -> Orchestrator {
        let store = Arc::new(
            ClaimStore::open_in_memory(StorageConfig::default(), CoreMetrics::new()).unwrap(),
        );
        let engine = SearchEngine::new(vec![], None);
        Orchestrator::new(default_registry(), engine, store)
    }

    #[tokio::test]
    async fn scenario_s1_direct_mode_runs_one_synthesizer() {
        let orch = orchestrator();
        let mut config = RuntimeConfig::default();
        config.reasoning_mode = ReasoningMode::Direct;
        config.loops = 2;
        let response = orch.run_query("mode test", &config).await.unwrap();
        assert_eq!(response.loops_used, 1);
        assert_eq!(response.agents_executed, vec!["Synthesizer".to_string()]);
    }

    #[tokio::test]
    async fn scenario_s5_unsupported_reasoning_mode_fails_fast() {
        // `ReasoningMode` is closed, so we exercise the fail-fast guard via
        // `validate()` being run first: an invalid loops count must also
        // short-circuit before any agent executes.
        let orch = orchestrator();
        let mut config = RuntimeConfig::default();
        config.loops = 0;
        let result = orch.run_query("q", &config).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rotate_opens_loop_with_primus_group() {
        let groups = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(rotate(&groups, 1), vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn dialectical_run_executes_groups_in_parallel_and_populates_trace() {
        let orch = orchestrator();
        let config = RuntimeConfig::default();
        let response = orch.run_query("what changed in the release?", &config).await.unwrap();
        // Scout pass's Synthesizer, plus Synthesizer/Contrarian/FactChecker
        // from at least one debate loop.
        assert!(response.agents_executed.len() >= 4);
        assert!(response.agents_executed.contains(&"Contrarian".to_string()));
        assert!(!response.react_trace.is_empty());
        assert!(response.knowledge_graph_graphml.contains("<graphml"));
    }

    #[tokio::test]
    async fn generous_timeouts_complete_without_a_timeout_error() {
        let orch = orchestrator();
        let config = RuntimeConfig::default();
        let response = orch.run_query("slow query", &config).await.unwrap();
        assert!(!response.errors.iter().any(|e| e.kind == ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn unresolvable_agent_group_is_skipped_without_panicking() {
        // Unknown names resolve to an empty agent list; `run_group` is never
        // dispatched for them and the response still completes.
        let orch = orchestrator();
        let mut config = RuntimeConfig::default();
        config.agent_groups = Some(vec![vec!["Unknown".to_string()]]);
        config.max_errors = 1;
        let response = orch.run_query("q", &config).await.unwrap();
        assert!(response.agents_executed.iter().all(|a| a != "Unknown"));
    }
}
