//! Prompt types for PhysRAG.

use serde::{Deserialize, Serialize};

/// A prompt definition loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// System instruction template (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// User message template with Handlebars syntax
    pub template: String,
}

/// The prompt families the orchestrator knows how to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    /// Grounded question answering
    Chat,
    /// Explanatory framing for a single concept
    Explain,
}

impl PromptKind {
    pub const ALL: [PromptKind; 2] = [PromptKind::Chat, PromptKind::Explain];

    /// Prompt ID used for built-ins and override files.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Chat => "physics.chat",
            Self::Explain => "physics.explain",
        }
    }
}

/// Values substituted into a template.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptVars {
    /// The user's question or concept
    pub question: String,

    /// Assembled grounding context; empty when nothing was retrieved
    pub context: String,

    /// Answer language
    pub language: String,
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPrompt {
    /// System message (optional)
    pub system: Option<String>,

    /// User message (required)
    pub user: String,

    /// Source prompt ID
    pub source_prompt_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_definition_deserialization() {
        let yaml = r#"
id: physics.chat
title: Test Prompt
apiVersion: "1.0"
system: "Answer in {{language}}"
template: "Q: {{question}}"
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.id, "physics.chat");
        assert_eq!(def.system.as_deref(), Some("Answer in {{language}}"));
    }

    #[test]
    fn test_system_is_optional() {
        let yaml = "id: x.y\ntitle: T\napiVersion: \"1.0\"\ntemplate: \"{{question}}\"\n";
        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(def.system.is_none());
    }

    #[test]
    fn test_kind_ids_are_distinct() {
        assert_ne!(PromptKind::Chat.id(), PromptKind::Explain.id());
    }
}
