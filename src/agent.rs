//! Polymorphic agent contract and registry.
//!
//! Each agent variant is capability-typed rather than duck-typed: a single
//! `Agent` trait object, tagged by `role()`, registered in an
//! [`AgentRegistry`] that maps name → factory. An agent MUST NOT mutate
//! `QueryState` directly; it returns a delta the Orchestrator merges
//! atomically at the group-completion boundary.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::claim::Claim;
use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::query_state::Message;

/// Read-only view of `QueryState` handed to agents; they cannot mutate the
/// aggregate directly.
pub struct AgentView<'a> {
    pub query: &'a str,
    pub loop_index: u32,
    pub claims: Vec<&'a Claim>,
}

/// The delta an agent returns; merged into `QueryState` by the Orchestrator.
#[derive(Debug, Clone, Default)]
pub struct AgentResult {
    pub claims: Vec<Claim>,
    pub messages: Vec<Message>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[async_trait]
pub trait Agent: Send + Sync {
    fn role(&self) -> &str;

    /// Prompt construction must be a deterministic function of
    /// `(state.claims, agent role, config)` — required for replay tests.
    fn build_prompt(&self, view: &AgentView<'_>, config: &RuntimeConfig) -> String;

    async fn execute(&self, view: AgentView<'_>, config: &RuntimeConfig) -> Result<AgentResult>;
}

/// Maps an agent name (or coalition name) to a factory closure, so
/// coalitions expand to ordered sequences of concrete agents.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    factories: HashMap<String, Arc<dyn Fn() -> Arc<dyn Agent> + Send + Sync>>,
    coalitions: HashMap<String, Vec<String>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Arc<dyn Agent> + Send + Sync + 'static,
    ) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn register_coalition(&mut self, name: impl Into<String>, members: Vec<String>) {
        self.coalitions.insert(name.into(), members);
    }

    /// Expands `names` (which may include coalitions) into concrete agent
    /// instances in declaration order.
    pub fn resolve(&self, names: &[String]) -> Vec<Arc<dyn Agent>> {
        let mut out = Vec::new();
        for name in names {
            if let Some(members) = self.coalitions.get(name) {
                for member in members {
                    if let Some(factory) = self.factories.get(member) {
                        out.push(factory());
                    }
                }
            } else if let Some(factory) = self.factories.get(name) {
                out.push(factory());
            }
        }
        out
    }
}

macro_rules! stub_agent {
    ($name:ident, $role:expr, $kind:expr) => {
        pub struct $name;

        #[async_trait]
        impl Agent for $name {
            fn role(&self) -> &str {
                $role
            }

            fn build_prompt(&self, view: &AgentView<'_>, _config: &RuntimeConfig) -> String {
                let claim_summaries: Vec<String> =
                    view.claims.iter().map(|c| format!("- {}", c.text)).collect();
                format!(
                    "[{}] query: {}\nprior claims:\n{}",
                    $role,
                    view.query,
                    claim_summaries.join("\n")
                )
            }

            async fn execute(&self, view: AgentView<'_>, config: &RuntimeConfig) -> Result<AgentResult> {
                let prompt = self.build_prompt(&view, config);
                let mut claim = Claim::new(format!("{} response to: {}", $role, view.query), $kind);
                claim.confidence = 0.5;
                Ok(AgentResult {
                    claims: vec![claim],
                    messages: vec![Message {
                        role: $role.to_string(),
                        content: prompt,
                    }],
                    prompt_tokens: 0,
                    completion_tokens: 0,
                })
            }
        }
    };
}

stub_agent!(Synthesizer, "Synthesizer", crate::claim::ClaimKind::Synthesis);
stub_agent!(Contrarian, "Contrarian", crate::claim::ClaimKind::Antithesis);
stub_agent!(FactChecker, "FactChecker", crate::claim::ClaimKind::Evidence);
stub_agent!(Researcher, "Researcher", crate::claim::ClaimKind::Evidence);
stub_agent!(Moderator, "Moderator", crate::claim::ClaimKind::Synthesis);
stub_agent!(Summarizer, "Summarizer", crate::claim::ClaimKind::Synthesis);
stub_agent!(DomainSpecialist, "DomainSpecialist", crate::claim::ClaimKind::Evidence);
stub_agent!(UserAgent, "UserAgent", crate::claim::ClaimKind::Thesis);

/// Builds the default registry with the canonical agent roster. Hosts
/// supplying real `ModelAdapter`-backed agents register their own factories
/// instead of (or alongside) these references.
pub fn default_registry() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry.register("Synthesizer", || Arc::new(Synthesizer));
    registry.register("Contrarian", || Arc::new(Contrarian));
    registry.register("FactChecker", || Arc::new(FactChecker));
    registry.register("Researcher", || Arc::new(Researcher));
    registry.register("Moderator", || Arc::new(Moderator));
    registry.register("Summarizer", || Arc::new(Summarizer));
    registry.register("DomainSpecialist", || Arc::new(DomainSpecialist));
    registry.register("UserAgent", || Arc::new(UserAgent));
    registry.register_coalition(
        "dialectical_trio".to_string(),
        vec![
            "Synthesizer".to_string(),
            "Contrarian".to_string(),
            "FactChecker".to_string(),
        ],
    );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalition_expands_to_member_sequence() {
        let registry = default_registry();
        let resolved = registry.resolve(&["dialectical_trio".to_string()]);
        let roles: Vec<&str> = resolved.iter().map(|a| a.role()).collect();
        assert_eq!(roles, vec!["Synthesizer", "Contrarian", "FactChecker"]);
    }

    #[tokio::test]
    async fn prompt_construction_is_deterministic() {
        let agent = Synthesizer;
        let config = RuntimeConfig::default();
        let claim = Claim::new("x", crate::claim::ClaimKind::Evidence);
        let view_a = AgentView {
            query: "q",
            loop_index: 0,
            claims: vec![&claim],
        };
        let view_b = AgentView {
            query: "q",
            loop_index: 0,
            claims: vec![&claim],
        };
        assert_eq!(
            agent.build_prompt(&view_a, &config),
            agent.build_prompt(&view_b, &config)
        );
    }
}
