//! Prompt contracts compiled into the binary.

/// Follow-up rewriting contract.
pub const REWRITE: &str = "route.rewrite";
/// Intent classification and query planning contract.
pub const PLAN: &str = "route.plan";
/// Structured result summarization contract.
pub const SUMMARIZE: &str = "route.summarize";
/// Final non-streaming answer contract.
pub const SYNTHESIZE: &str = "route.synthesize";
/// Streaming FAQ answer contract.
pub const ANSWER: &str = "route.answer";

const SOURCES: &[(&str, &str)] = &[
    (REWRITE, include_str!("../prompts/route.rewrite.yml")),
    (PLAN, include_str!("../prompts/route.plan.yml")),
    (SUMMARIZE, include_str!("../prompts/route.summarize.yml")),
    (SYNTHESIZE, include_str!("../prompts/route.synthesize.yml")),
    (ANSWER, include_str!("../prompts/route.answer.yml")),
];

/// Raw YAML of a built-in prompt.
pub fn source(id: &str) -> Option<&'static str> {
    SOURCES
        .iter()
        .find(|(builtin_id, _)| *builtin_id == id)
        .map(|(_, yaml)| *yaml)
}

/// Every built-in prompt id.
pub fn ids() -> impl Iterator<Item = &'static str> {
    SOURCES.iter().map(|(id, _)| *id)
}
