//! The AI persona: screens visitor messages, assembles the prompt from the
//! profile's resumes and recent conversation, and turns generator output
//! (or failures) into reply text.

pub mod guard;
pub mod prompt;
mod responder;

pub use responder::{Persona, PersonaRequest, NO_API_KEY_MESSAGE};
