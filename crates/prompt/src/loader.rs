//! Prompt loader for built-in and YAML override definitions.

use crate::types::{PromptDefinition, PromptKind};
use physrag_core::{AppError, AppResult};
use std::collections::HashMap;
use std::path::Path;

const BUILTIN_CHAT: &str = include_str!("../prompts/physics.chat.yml");
const BUILTIN_EXPLAIN: &str = include_str!("../prompts/physics.explain.yml");

/// Parse the prompt definition shipped with the crate for `kind`.
pub fn builtin_prompt(kind: PromptKind) -> AppResult<PromptDefinition> {
    let source = match kind {
        PromptKind::Chat => BUILTIN_CHAT,
        PromptKind::Explain => BUILTIN_EXPLAIN,
    };
    parse_prompt(source, kind.id())
}

/// Load every `*.yml`/`*.yaml` prompt definition in `prompts_dir`, keyed by ID.
///
/// A missing directory yields an empty map.
///
/// # Example
/// ```no_run
/// use physrag_prompt::load_overrides;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let overrides = load_overrides(Path::new("prompts"))?;
/// println!("{} prompt overrides", overrides.len());
/// # Ok(())
/// # }
/// ```
pub fn load_overrides(prompts_dir: &Path) -> AppResult<HashMap<String, PromptDefinition>> {
    let mut definitions = HashMap::new();

    if !prompts_dir.exists() {
        tracing::debug!("Prompt directory {:?} not found, using built-ins", prompts_dir);
        return Ok(definitions);
    }

    for entry in walkdir::WalkDir::new(prompts_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|s| s.to_str()),
            Some("yml") | Some("yaml")
        );
        if !path.is_file() || !is_yaml {
            continue;
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Prompt(format!("Failed to read prompt file {:?}: {}", path, e))
        })?;
        let definition = parse_prompt(&contents, &path.display().to_string())?;

        tracing::info!("Loaded prompt override: {} ({})", definition.id, definition.title);
        definitions.insert(definition.id.clone(), definition);
    }

    Ok(definitions)
}

fn parse_prompt(contents: &str, origin: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents)
        .map_err(|e| AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", origin, e)))?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.trim().is_empty() {
        return Err(AppError::Prompt(format!(
            "Prompt {} has an empty template",
            def.id
        )));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}
