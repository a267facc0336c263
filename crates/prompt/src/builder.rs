//! Prompt builder: compiles the templates once and renders them per request.

use crate::loader::{builtin_prompt, load_overrides};
use crate::types::{BuiltPrompt, PromptDefinition, PromptKind, PromptVars};
use handlebars::Handlebars;
use physrag_core::{AppError, AppResult};
use std::path::Path;

/// The compiled chat and explain templates.
///
/// Built-ins are used unless a definition with the same ID is found in
/// the overrides directory.
pub struct PromptSet {
    handlebars: Handlebars<'static>,
}

impl PromptSet {
    /// Compile built-ins, replacing any that `prompts_dir` overrides.
    ///
    /// # Example
    /// ```no_run
    /// use physrag_prompt::{PromptKind, PromptSet, PromptVars};
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let prompts = PromptSet::new(None)?;
    /// let vars = PromptVars {
    ///     question: "What is inertia?".to_string(),
    ///     context: String::new(),
    ///     language: "English".to_string(),
    /// };
    /// let built = prompts.render(PromptKind::Chat, &vars)?;
    /// println!("{}", built.user);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(prompts_dir: Option<&Path>) -> AppResult<Self> {
        let mut overrides = match prompts_dir {
            Some(dir) => load_overrides(dir)?,
            None => Default::default(),
        };

        let mut handlebars = Handlebars::new();
        // Plain text, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        for kind in PromptKind::ALL {
            let definition = match overrides.remove(kind.id()) {
                Some(def) => def,
                None => builtin_prompt(kind)?,
            };
            register(&mut handlebars, kind, &definition)?;
        }

        Ok(Self { handlebars })
    }

    /// Render the prompt family `kind` with `vars`.
    pub fn render(&self, kind: PromptKind, vars: &PromptVars) -> AppResult<BuiltPrompt> {
        tracing::debug!("Building prompt: {}", kind.id());

        let user = self
            .handlebars
            .render(kind.id(), vars)
            .map_err(|e| AppError::Prompt(format!("Failed to render {}: {}", kind.id(), e)))?;

        let system_name = system_template_name(kind);
        let system = if self.handlebars.has_template(&system_name) {
            Some(
                self.handlebars
                    .render(&system_name, vars)
                    .map_err(|e| AppError::Prompt(format!("Failed to render {}: {}", system_name, e)))?
                    .trim()
                    .to_string(),
            )
        } else {
            None
        };

        Ok(BuiltPrompt {
            system,
            user: user.trim().to_string(),
            source_prompt_id: kind.id().to_string(),
        })
    }
}

fn system_template_name(kind: PromptKind) -> String {
    format!("{}.system", kind.id())
}

fn register(
    handlebars: &mut Handlebars<'static>,
    kind: PromptKind,
    definition: &PromptDefinition,
) -> AppResult<()> {
    handlebars
        .register_template_string(kind.id(), &definition.template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template {}: {}", definition.id, e)))?;

    if let Some(ref system) = definition.system {
        handlebars
            .register_template_string(&system_template_name(kind), system)
            .map_err(|e| {
                AppError::Prompt(format!("Failed to register system template {}: {}", definition.id, e))
            })?;
    }

    Ok(())
}
