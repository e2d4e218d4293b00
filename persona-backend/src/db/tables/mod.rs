//! Database model modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table group.

mod auth;           // auth_sessions
mod users;          // users
mod chat_sessions;  // chat_sessions, chat_messages
mod settings;       // settings
mod profiles;       // profiles, profile_resumes
mod resumes;        // resumes

pub use profiles::ProfileUpdate;
