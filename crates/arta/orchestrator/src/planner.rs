//! Fixed intent → plan mapping.

use arta_types::{Intent, Plan, PlanStep, StepKind};

/// Below this classifier confidence the turn must clarify instead of acting:
/// tool steps demote to no-ops and the response carries a followup question.
pub const CONFIDENCE_FLOOR: f64 = 0.4;

/// The single clarifying sentence attached to low-confidence turns.
pub const CLARIFIER_FOLLOWUP: &str =
    "Could you clarify your request so I can recommend the right action?";

pub(crate) fn unknown_intent_reply() -> &'static str {
    "I'm not sure how to help with that yet, but I'm learning more every day!"
}

/// Build the plan for a classified intent. Step ids are globally unique so
/// `depends_on` references stay unambiguous.
pub fn plan_for(intent: Intent) -> Plan {
    let steps = match intent {
        Intent::RecordTransaction => vec![
            PlanStep::new(
                "extract-transaction",
                StepKind::Llm,
                "extract structured transaction fields from the message",
            )
            .with_action("extract-transaction"),
            PlanStep::new(
                "persist-transaction",
                StepKind::Tool,
                "persist the extracted transaction",
            )
            .with_tool("transactions.create")
            .depends_on(&["extract-transaction"]),
            PlanStep::new("respond-user", StepKind::Synthesis, "confirm the recorded entry")
                .depends_on(&["persist-transaction"]),
        ],
        Intent::BudgetSummary => vec![
            PlanStep::new(
                "retrieve-context",
                StepKind::Retrieval,
                "retrieve prior monthly context",
            ),
            PlanStep::new(
                "summarize-month",
                StepKind::Llm,
                "summarise the month over the retrieved context",
            )
            .with_action("summarize-month")
            .depends_on(&["retrieve-context"]),
            PlanStep::new("respond-user", StepKind::Synthesis, "deliver the summary")
                .depends_on(&["summarize-month"]),
        ],
        Intent::GeneralQuestion => vec![
            PlanStep::new(
                "retrieve-context",
                StepKind::Retrieval,
                "retrieve prior monthly context",
            ),
            PlanStep::new(
                "respond-user",
                StepKind::Synthesis,
                "answer grounded in the retrieved context",
            )
            .depends_on(&["retrieve-context"]),
        ],
        Intent::Unknown => vec![PlanStep::new(
            "respond-user",
            StepKind::Synthesis,
            "acknowledge the unrecognised request",
        )],
    };
    Plan::new(steps)
}
