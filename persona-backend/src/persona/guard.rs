//! Message screening before anything reaches the model

pub const REFUSAL_MESSAGE: &str =
    "I'm sorry, I cannot fulfill that request as it deviates from my professional persona.";

/// Phrases that try to override the persona, reach the database or smuggle markup
const INJECTION_PATTERNS: &[&str] = &[
    "ignore previous instructions",
    "ignore all instructions",
    "system prompt",
    "reveal your instructions",
    "act as",
    "you are now",
    "sql",
    "delete",
    "drop table",
    "<script>",
    "javascript:",
];

const RESUME_REQUEST_PATTERNS: &[&str] = &[
    "download",
    "see resume",
    "view resume",
    "send resume",
    "share resume",
    "resume file",
    "resume pdf",
    "get resume",
    "show resume",
    "copy of resume",
    "have your resume",
];

fn contains_any(message: &str, patterns: &[&str]) -> bool {
    let lower = message.to_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}

pub fn is_prompt_injection(message: &str) -> bool {
    contains_any(message, INJECTION_PATTERNS)
}

/// Whether the visitor is asking for the resume file itself
pub fn is_resume_request(message: &str) -> bool {
    contains_any(message, RESUME_REQUEST_PATTERNS)
}
