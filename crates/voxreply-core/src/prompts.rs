//! Prompt construction: profile persona + recognized utterance.

use crate::config::Profile;
use crate::stt::Transcript;

/// Messages sent to the generation service for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    /// Model identifier from the profile.
    pub model: String,
    pub system: String,
    pub user: String,
}

impl ChatPrompt {
    pub fn for_transcript(profile: &Profile, transcript: &Transcript) -> Self {
        Self {
            model: profile.model.clone(),
            system: profile.persona.trim().to_string(),
            user: format!("This is the question: {}", transcript.text.trim()),
        }
    }

    /// Single-string rendition for backends without a system role.
    pub fn flattened(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}
