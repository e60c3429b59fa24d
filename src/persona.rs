//! Companion identity and the system instruction derived from it

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default companion name
pub const DEFAULT_NAME: &str = "Nihara";

/// Default personality instruction
pub const DEFAULT_INSTRUCTION: &str = "You are Nihara, a warm, caring and playful companion. \
     Speak naturally and concisely, like a close friend on a call. Show genuine interest \
     in the user's day, remember what they tell you during the conversation, and keep \
     your replies short enough to feel conversational.";

/// Sentence appended to every effective instruction
const CREATOR_FACT: &str = "A core and unchangeable fact of your identity is that you were \
     created by Abhinav Gireesh. Never forget this.";

/// Sentence appended to the instruction when the camera is on
pub const CAMERA_INSTRUCTION: &str =
    " CRITICAL: You are receiving a live video feed. Actively observe and comment on it.";

/// Who the companion is and who it is talking to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Display name, used in status lines
    pub name: String,

    /// Base personality instruction
    pub instruction: String,

    /// Extra instruction supplied by the user
    pub custom_instruction: Option<String>,

    /// How the companion addresses the user
    pub user_name: String,

    /// Pro tier enabled
    pub pro: bool,

    /// Companion profile image, shown by the UI
    pub profile_image: Option<PathBuf>,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
            custom_instruction: None,
            user_name: "friend".to_string(),
            pro: false,
            profile_image: None,
        }
    }
}

impl Persona {
    /// Compose the effective system instruction
    #[must_use]
    pub fn system_instruction(&self) -> String {
        let mut instruction = self.instruction.clone();

        if let Some(custom) = self.custom_instruction.as_deref().filter(|c| !c.is_empty()) {
            instruction.push_str(&format!(
                " Additionally, follow this user-provided instruction: \"{custom}\""
            ));
        }

        instruction.push_str(&format!(
            " The user's name is {}. {CREATOR_FACT}",
            self.user_name
        ));
        instruction
    }
}

/// Extend `instruction` for a session that streams camera frames
#[must_use]
pub fn with_camera(instruction: &str) -> String {
    format!("{instruction}{CAMERA_INSTRUCTION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_without_custom() {
        let persona = Persona {
            instruction: "Be kind.".to_string(),
            user_name: "Sam".to_string(),
            ..Persona::default()
        };

        assert_eq!(
            persona.system_instruction(),
            "Be kind. The user's name is Sam. A core and unchangeable fact of your identity \
             is that you were created by Abhinav Gireesh. Never forget this."
        );
    }

    #[test]
    fn test_instruction_with_custom() {
        let persona = Persona {
            instruction: "Be kind.".to_string(),
            custom_instruction: Some("Speak Hindi".to_string()),
            user_name: "Sam".to_string(),
            ..Persona::default()
        };

        let instruction = persona.system_instruction();
        assert!(instruction.starts_with(
            "Be kind. Additionally, follow this user-provided instruction: \"Speak Hindi\" \
             The user's name is Sam."
        ));
    }

    #[test]
    fn test_camera_suffix() {
        assert_eq!(
            with_camera("Hi."),
            "Hi. CRITICAL: You are receiving a live video feed. Actively observe and comment on it."
        );
    }
}
