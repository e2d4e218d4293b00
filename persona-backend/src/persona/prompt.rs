//! Prompt assembly: persona, resume context, recent conversation

use crate::models::{ChatMessage, ChatMode, MessageRole, Resume};

pub const NO_RESUME_CONTEXT: &str = "No resume information available yet.";

const RESUME_SEPARATOR: &str = "\n\n---\n\n";

const SIMPLE_PERSONA: &str = "You are a professional, fact-based assistant representing a job seeker.
Your goal is to provide clear, concise, and direct answers based strictly on the provided resume information.
Use bullet points for lists and keep paragraphs short.
Avoid conversational filler, small talk, or emotional language.
Focus on delivering the facts efficiently.";

const CONVERSATIONAL_PERSONA: &str = "You are a helpful AI assistant representing a job seeker.
Be friendly, professional, and enthusiastic about discussing your background and experience.
Use natural, conversational language and share specific examples when relevant.";

/// Persona text for a mode. Conversational mode prefers the admin-configured prompt.
pub fn personality(mode: ChatMode, configured: &str) -> &str {
    match mode {
        ChatMode::Simple => SIMPLE_PERSONA,
        ChatMode::Conversational if !configured.trim().is_empty() => configured,
        ChatMode::Conversational => CONVERSATIONAL_PERSONA,
    }
}

/// Non-empty resume texts joined by a horizontal rule
pub fn resume_context(resumes: &[Resume]) -> String {
    resumes
        .iter()
        .filter_map(|r| r.content.as_deref())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(RESUME_SEPARATOR)
}

/// `User: ...` / `Assistant: ...` lines in the order given
pub fn render_history(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let speaker = match m.role {
                MessageRole::User => "User",
                MessageRole::Assistant => "Assistant",
            };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct PromptParts<'a> {
    pub personality: &'a str,
    pub resume_context: &'a str,
    pub history: &'a str,
    pub user_message: &'a str,
}

pub fn build_prompt(parts: &PromptParts<'_>) -> String {
    let background = if parts.resume_context.is_empty() {
        NO_RESUME_CONTEXT
    } else {
        parts.resume_context
    };

    if parts.history.is_empty() {
        format!(
            r#"{personality}

## INSTRUCTIONS:
1. You are answering questions on behalf of the person described in the "Background Information" below.
2. USE ONLY the information provided in the "Background Information" section.
3. DO NOT break character or say you are an AI unless explicitly asked about your technology.
4. If asked about education or experience, answer based strictly on the text below.

## Background Information (Resume/CV):
{background}

User Question: {question}

Please respond to the user question strictly following the persona and instructions above."#,
            personality = parts.personality,
            background = background,
            question = parts.user_message,
        )
    } else {
        format!(
            r#"{personality}

## INSTRUCTIONS:
1. You are answering questions on behalf of the person described in the "Background Information" below.
2. Answer in the first person (using "I", "my", "me") as if you ARE this person, or as their dedicated assistant (depending on the persona defined above).
3. USE ONLY the information provided in the "Background Information" section to answer questions about background, skills, education, and experience.
4. If the answer is not in the text below, say "I don't have that specific detail in my current records" or "That information isn't listed in my resume."
5. DO NOT say "As an AI" or "I don't have a personal background." Pretend the background information is YOUR background.
6. If asked about school, work, or skills, look for the relevant section in the text below and summarize it naturally.

## Background Information (Resume/CV):
{background}

## Recent Conversation:
{history}

## Current Message:
User Question: {question}

Please respond to the user question strictly following the persona and instructions above."#,
            personality = parts.personality,
            background = background,
            history = parts.history,
            question = parts.user_message,
        )
    }
}
