use std::sync::Arc;

use futures_util::future::ready;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::ai::{GenerationConfig, TextGenerator};
use crate::db::Database;
use crate::models::{ChatMode, Profile};
use crate::persona::{guard, prompt};
use crate::security::audit;

pub const NO_API_KEY_MESSAGE: &str =
    "Gemini API key not configured. Please add your API key to use AI responses.";
const APOLOGY_MESSAGE: &str =
    "I apologize, but I'm having trouble generating a response right now. Please try again in a moment.";
const STREAM_ERROR_SUFFIX: &str = " [Error generating response]";

/// Messages of context sent along with the current one
const HISTORY_LIMIT: usize = 10;

/// Everything needed to answer one visitor message
#[derive(Debug, Clone)]
pub struct PersonaRequest {
    /// Public session key, used for logging
    pub session_key: String,
    /// Database id of the chat session, when it exists
    pub chat_session_id: Option<i64>,
    /// History is read from messages stored up to and including this id
    pub history_through: i64,
    pub message: String,
    pub mode: ChatMode,
    pub profile_id: Option<i64>,
    /// Scheme and host used for download links
    pub base_url: String,
    pub client_ip: String,
}

/// What to do with a request once it has been screened and its prompt built
enum Plan {
    Reply(String),
    Generate {
        prompt: String,
        config: GenerationConfig,
        download_link: Option<String>,
    },
}

pub struct Persona {
    db: Arc<Database>,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl Persona {
    pub fn new(db: Arc<Database>, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { db, generator }
    }

    /// Produce the whole reply at once
    pub async fn respond(&self, request: &PersonaRequest) -> String {
        let (prompt, config, download_link) = match self.plan(request) {
            Plan::Reply(text) => return text,
            Plan::Generate {
                prompt,
                config,
                download_link,
            } => (prompt, config, download_link),
        };

        let Some(generator) = &self.generator else {
            return NO_API_KEY_MESSAGE.to_string();
        };

        match generator.generate(&prompt, &config).await {
            Ok(mut text) => {
                if let Some(link) = download_link {
                    text.push_str(&link);
                }
                text
            }
            Err(e) => {
                log::error!("Error generating response for session {}: {}", request.session_key, e);
                APOLOGY_MESSAGE.to_string()
            }
        }
    }

    /// Produce the reply as a stream of chunks. Never fails: fixed replies and
    /// early errors arrive as a single chunk, mid-stream errors end the stream
    /// with [`STREAM_ERROR_SUFFIX`].
    pub async fn respond_stream(&self, request: &PersonaRequest) -> BoxStream<'static, String> {
        let (prompt, config, download_link) = match self.plan(request) {
            Plan::Reply(text) => return stream::once(ready(text)).boxed(),
            Plan::Generate {
                prompt,
                config,
                download_link,
            } => (prompt, config, download_link),
        };

        let Some(generator) = &self.generator else {
            return stream::once(ready(NO_API_KEY_MESSAGE.to_string())).boxed();
        };

        let chunks = match generator.generate_stream(&prompt, &config).await {
            Ok(chunks) => chunks,
            Err(e) => {
                log::error!("Error starting stream for session {}: {}", request.session_key, e);
                return stream::once(ready(APOLOGY_MESSAGE.to_string())).boxed();
            }
        };

        let session_key = request.session_key.clone();
        chunks
            .scan(false, move |failed, item| {
                if *failed {
                    return ready(None);
                }
                match item {
                    Ok(text) => ready(Some(text)),
                    Err(e) => {
                        log::error!("Error in response stream for session {}: {}", session_key, e);
                        *failed = true;
                        ready(Some(STREAM_ERROR_SUFFIX.to_string()))
                    }
                }
            })
            .chain(stream::iter(download_link))
            .boxed()
    }

    fn plan(&self, request: &PersonaRequest) -> Plan {
        if guard::is_prompt_injection(&request.message) {
            audit::suspicious_activity(
                &format!("Potential prompt injection detected: {}", request.message),
                Some(&format!("Session:{}", request.session_key)),
                &request.client_ip,
            );
            return Plan::Reply(guard::REFUSAL_MESSAGE.to_string());
        }

        match self.build_plan(request) {
            Ok(plan) => plan,
            Err(e) => {
                log::error!("Error preparing prompt for session {}: {}", request.session_key, e);
                Plan::Reply(APOLOGY_MESSAGE.to_string())
            }
        }
    }

    fn build_plan(&self, request: &PersonaRequest) -> rusqlite::Result<Plan> {
        let settings = self.db.get_settings()?;

        let profile_id = match request.profile_id {
            Some(id) => id,
            None => self.db.get_or_create_default_profile()?.id,
        };
        let resumes = self.db.get_active_resumes(profile_id)?;
        let resume_context = prompt::resume_context(&resumes);

        let history = match request.chat_session_id {
            Some(id) => self
                .db
                .get_recent_chat_messages(id, request.history_through, HISTORY_LIMIT)?,
            None => Vec::new(),
        };
        let history = prompt::render_history(&history);

        let full_prompt = prompt::build_prompt(&prompt::PromptParts {
            personality: prompt::personality(request.mode, &settings.personality_prompt),
            resume_context: &resume_context,
            history: &history,
            user_message: &request.message,
        });

        let download_link = if guard::is_resume_request(&request.message) {
            let profile = self.db.get_profile(profile_id)?;
            self.download_link(profile.as_ref(), &request.base_url)?
        } else {
            None
        };

        Ok(Plan::Generate {
            prompt: full_prompt,
            config: GenerationConfig::for_mode(request.mode),
            download_link,
        })
    }

    fn download_link(
        &self,
        profile: Option<&Profile>,
        base_url: &str,
    ) -> rusqlite::Result<Option<String>> {
        let Some(resume_id) = profile.and_then(|p| p.primary_resume_id) else {
            return Ok(None);
        };
        Ok(self.db.get_resume(resume_id)?.map(|resume| {
            format!(
                "\n\nYou can download my resume here: {}/uploads/resumes/{}",
                base_url.trim_end_matches('/'),
                resume.filename
            )
        }))
    }
}
