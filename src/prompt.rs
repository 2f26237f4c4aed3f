use dialoguer::{Input, theme::ColorfulTheme};

use crate::error::{AssumeRoleError, Result};

/// Source of answers for inputs that were not given on the command line
pub trait Prompt {
    /// Ask for `label`. `Ok(None)` means asking is not possible here.
    fn ask(&self, label: &str, default: Option<&str>) -> Result<Option<String>>;
}

/// Asks on the terminal. dialoguer draws on stderr, so stdout stays clean.
#[derive(Default)]
pub struct TerminalPrompt {
    theme: ColorfulTheme,
}

impl Prompt for TerminalPrompt {
    fn ask(&self, label: &str, default: Option<&str>) -> Result<Option<String>> {
        let mut input = Input::<String>::with_theme(&self.theme)
            .with_prompt(label)
            .allow_empty(true);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }

        let answer = input
            .interact_text()
            .map_err(|e| AssumeRoleError::Prompt(e.to_string()))?;

        Ok(Some(answer.trim().to_string()).filter(|a| !a.is_empty()))
    }
}

/// Never asks; used when stdout is being captured for `eval`
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;

impl Prompt for NoPrompt {
    fn ask(&self, label: &str, _default: Option<&str>) -> Result<Option<String>> {
        tracing::debug!("Not prompting for {} in eval mode", label);
        Ok(None)
    }
}
