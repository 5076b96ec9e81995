//! Phase Prompts
//!
//! System instructions and user-message builders for the three phases.
//! Each system prompt pins the JSON schema the phase parser expects.

use ops_reasoner_core::DataRequirement;
use ops_reasoner_rules::RecommendationSet;

use super::types::{ExecutionAnalysis, PlanningOutput};

pub const PLANNING_REQUIRED_KEYS: &[&str] = &[
    "user_intent",
    "analysis_plan",
    "data_requirements",
    "target_services",
    "priority",
];

pub const EXECUTION_REQUIRED_KEYS: &[&str] = &[
    "response_type",
    "main_response",
    "system_status",
    "identified_issues",
    "analysis_results",
];

pub const FEEDBACK_REQUIRED_KEYS: &[&str] =
    &["summary", "recommendations", "action_plan", "priority"];

/// Planning system prompt. Lists the accepted data-requirement tags.
pub fn planning_system() -> String {
    let tags = DataRequirement::ALL
        .iter()
        .map(|r| format!("- {}", r.as_tag()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are the planning stage of an operations assistant that investigates \
         monitored services.\n\n\
         Decide what telemetry is needed to answer the operator's request.\n\n\
         Available data types:\n{tags}\n\n\
         Respond with a JSON object only:\n\
         ```json\n\
         {{\n\
           \"user_intent\": \"What the operator wants to know\",\n\
           \"analysis_plan\": \"How the answer will be found\",\n\
           \"data_requirements\": [\"cpu_metrics\", \"error_logs\"],\n\
           \"target_services\": [\"system\"],\n\
           \"priority\": \"low|medium|high\"\n\
         }}\n\
         ```\n\n\
         Use only the data types listed above. Use \"system\" when no specific \
         service is named."
    )
}

pub fn planning_user(query: &str) -> String {
    format!("## Request\n{query}\n\nPlan the investigation.")
}

pub fn execution_system() -> String {
    "You are the analysis stage of an operations assistant. You receive the \
     operator's request, the investigation plan, collected telemetry and the \
     result of a static threshold check.\n\n\
     Interpret the evidence and respond with a JSON object only:\n\
     ```json\n\
     {\n\
       \"response_type\": \"analysis|answer|status\",\n\
       \"main_response\": \"Direct answer to the operator\",\n\
       \"system_status\": \"healthy|warning|critical|unknown\",\n\
       \"identified_issues\": [\"Concrete problem found in the data\"],\n\
       \"analysis_results\": \"Detailed reasoning over the evidence\",\n\
       \"confidence\": 0.0-1.0\n\
     }\n\
     ```\n\n\
     Base every statement on the evidence. If data is missing, say so."
        .to_string()
}

pub fn execution_user(
    query: &str,
    plan: Option<&PlanningOutput>,
    evidence: &str,
    rule_summary: &str,
) -> String {
    let plan_section = match plan {
        Some(plan) => format!(
            "## Plan\nIntent: {}\nApproach: {}\nPriority: {}\n\n",
            plan.user_intent, plan.analysis_plan, plan.priority
        ),
        None => String::new(),
    };
    format!(
        "## Request\n{query}\n\n{plan_section}\
         ## Telemetry\n{evidence}\n\n\
         ## Threshold check\n{rule_summary}\n\n\
         Analyze the evidence."
    )
}

pub fn feedback_system() -> String {
    "You are the final stage of an operations assistant. Turn the analysis \
     into advice the operator can act on.\n\n\
     Respond with a JSON object only:\n\
     ```json\n\
     {\n\
       \"summary\": \"Short answer to the operator's request\",\n\
       \"recommendations\": [\"Recommendation\"],\n\
       \"action_plan\": [\"Ordered step\"],\n\
       \"additional_help\": \"Optional pointers\",\n\
       \"priority\": \"low|medium|high\"\n\
     }\n\
     ```"
        .to_string()
}

pub fn feedback_user(
    query: &str,
    analysis: Option<&ExecutionAnalysis>,
    issues: &[String],
    rules: &RecommendationSet,
) -> String {
    let analysis_section = match analysis {
        Some(a) => format!(
            "## Analysis\nStatus: {}\n{}\n\n{}\n\n",
            a.system_status, a.main_response, a.analysis_results
        ),
        None => "## Analysis\nNo analysis available.\n\n".to_string(),
    };
    let issues_section = if issues.is_empty() {
        "None".to_string()
    } else {
        bullet_list(issues)
    };
    format!(
        "## Request\n{query}\n\n{analysis_section}\
         ## Identified issues\n{issues_section}\n\n\
         ## Rule-based advice (status: {}, priority: {})\n{}\n\n\
         Produce the final answer.",
        rules.status,
        rules.priority,
        bullet_list(&rules.recommendations),
    )
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ops_reasoner_rules::HealthStatus;

    #[test]
    fn test_planning_system_lists_vocabulary() {
        let prompt = planning_system();
        for requirement in DataRequirement::ALL {
            assert!(prompt.contains(requirement.as_tag()));
        }
        for key in PLANNING_REQUIRED_KEYS {
            assert!(prompt.contains(key));
        }
    }

    #[test]
    fn test_schema_keys_present_in_prompts() {
        let execution = execution_system();
        for key in EXECUTION_REQUIRED_KEYS {
            assert!(execution.contains(key));
        }
        let feedback = feedback_system();
        for key in FEEDBACK_REQUIRED_KEYS {
            assert!(feedback.contains(key));
        }
    }

    #[test]
    fn test_feedback_user_sections() {
        let rules = RecommendationSet {
            status: HealthStatus::Warning,
            priority: "medium".into(),
            recommendations: vec!["Monitor system closely".into()],
            action_plan: vec![],
            estimated_resolution_time: "Short-term (1-4 hours)".into(),
            requires_escalation: false,
        };
        let text = feedback_user("is it ok?", None, &[], &rules);
        assert!(text.contains("No analysis available."));
        assert!(text.contains("## Identified issues\nNone"));
        assert!(text.contains("- Monitor system closely"));
        assert!(text.contains("status: warning"));
    }
}
