//! Request-scoped execution plans.
//!
//! A plan is a short dependency DAG (≤4 nodes in practice) over typed steps.
//! Step ids are globally unique within a plan so `depends_on` stays
//! unambiguous; execution is strictly sequential in list order.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Retrieval,
    Llm,
    Tool,
    Synthesis,
}

/// One node of the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub description: String,
    /// Dispatch tag for `llm` steps (`extract-transaction`, `summarize-month`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Registered tool name for `tool` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, kind: StepKind, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            description: description.into(),
            action: None,
            tool: None,
            input: None,
            depends_on: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.depends_on = ids.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Ordered list of steps for one request. Discarded when the request ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    /// True when every `depends_on` id names an earlier step in the list.
    pub fn dependencies_ordered(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if !step.depends_on.iter().all(|dep| seen.contains(dep.as_str())) {
                return false;
            }
            seen.insert(step.id.as_str());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_serializes_kind_under_type() {
        let step = PlanStep::new("respond-user", StepKind::Synthesis, "compose the reply");
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["type"], "synthesis");
        assert!(value.get("dependsOn").is_none());
    }

    #[test]
    fn dependency_ordering_check() {
        let ordered = Plan::new(vec![
            PlanStep::new("a", StepKind::Llm, "first"),
            PlanStep::new("b", StepKind::Tool, "second").depends_on(&["a"]),
        ]);
        assert!(ordered.dependencies_ordered());

        let unordered = Plan::new(vec![
            PlanStep::new("b", StepKind::Tool, "second").depends_on(&["a"]),
            PlanStep::new("a", StepKind::Llm, "first"),
        ]);
        assert!(!unordered.dependencies_ordered());
    }
}
