//! Dry-Run Simulator — deterministic canned results per agent kind.
//!
//! When the process-wide dry-run flag is set, every stage routes here
//! instead of doing real work. Results always carry `dry_run: true` and
//! never touch usage accounting; dry runs are zero-cost by construction.
//! Dispatch is total over the closed [`AgentKind`] enum, so an unknown
//! kind is unrepresentable.

use crate::pipeline::types::{
    AgentKind, AssessmentQuestion, AssessmentSet, ComplexityTier, ContentAnalysis, ContentDomain,
    CurriculumOutline, ExtractionResult, ModuleOutline, QuestionType, ScoringRubric, StageOutput,
};

/// Synthetic resource id embedded in simulated extraction text.
pub const DRY_RUN_RESOURCE_ID: &str = "dry-run-resource";

const DRY_RUN_MODULE_COUNT: usize = 3;
const DRY_RUN_QUESTION_COUNT: usize = 5;
const DRY_RUN_WORD_COUNT: usize = 42;

/// Produce the canned result for a kind. Always succeeds; input is
/// deliberately ignored so simulated runs are reproducible.
pub fn simulate(kind: AgentKind) -> StageOutput {
    match kind {
        AgentKind::Extract => StageOutput::Extract(simulated_extraction()),
        AgentKind::Curriculum => StageOutput::Curriculum(simulated_curriculum()),
        AgentKind::Assessment => StageOutput::Assessment(simulated_assessment()),
    }
}

fn simulated_extraction() -> ExtractionResult {
    let text = format!("Simulated extraction for {DRY_RUN_RESOURCE_ID}.");
    ExtractionResult {
        source_name: DRY_RUN_RESOURCE_ID.to_string(),
        text,
        page_count: 1,
        analysis: ContentAnalysis {
            word_count: DRY_RUN_WORD_COUNT,
            char_count: 256,
            reading_minutes: 1,
            domain: ContentDomain::General,
            complexity: ComplexityTier::Intermediate,
            key_topics: vec!["simulated".to_string()],
        },
        degraded: false,
        dry_run: true,
    }
}

fn simulated_curriculum() -> CurriculumOutline {
    let modules = (0..DRY_RUN_MODULE_COUNT)
        .map(|i| ModuleOutline {
            id: format!("module_{i}"),
            title: format!("Simulated Module {i}"),
            objectives: vec![format!("Objective for module {i}")],
            key_topics: vec!["simulated".to_string()],
        })
        .collect();
    CurriculumOutline {
        subject: "simulated".to_string(),
        grade_level: "simulated".to_string(),
        modules,
        estimated_minutes: 90,
        dry_run: true,
    }
}

fn simulated_assessment() -> AssessmentSet {
    let questions = (0..DRY_RUN_QUESTION_COUNT)
        .map(|i| AssessmentQuestion {
            module_id: format!("module_{}", i % DRY_RUN_MODULE_COUNT),
            prompt: format!("Simulated question {i}?"),
            question_type: if i % 2 == 0 {
                QuestionType::MultipleChoice
            } else {
                QuestionType::ShortAnswer
            },
            points: 10,
        })
        .collect();
    AssessmentSet {
        questions,
        rubric: ScoringRubric { total_points: 50, pass_threshold_pct: 70 },
        dry_run: true,
    }
}
