mod chat_session;
mod profile;
mod resume;
mod session;
mod settings;
mod user;

pub use chat_session::{ChatMessage, ChatMode, ChatSession, MessageRole, NewChatSession};
pub use profile::{Profile, ProfileRequest};
pub use resume::Resume;
pub use session::Session;
pub use settings::{
    PersonaSettings, DEFAULT_CHATBOT_ICON, DEFAULT_CHATBOT_NAME,
};
pub use user::{User, UserResponse, LOCKOUT_MINUTES, MAX_FAILED_LOGINS};
