use std::{
    collections::HashMap,
    env,
    io::{self, IsTerminal, Write},
    process::ExitStatus,
};

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

use crate::{constants::FALLBACK_SHELL, session::EnvChange};

/// Marker set in the child shell started by direct mode
pub const SHELL_MARKER: &str = "AWS_ASSUME_ROLE_SHELL";

/// How environment changes reach the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Shell statements on stdout for `eval "$(assume-role ...)"`
    Eval,
    /// Applied to a child shell started in the foreground
    Direct,
}

impl Delivery {
    /// Eval when forced or when stdout is captured by the caller
    pub fn detect(force_eval: bool) -> Self {
        if force_eval || !io::stdout().is_terminal() {
            Self::Eval
        } else {
            Self::Direct
        }
    }

    /// Only direct mode may stop and ask for missing input
    pub fn allows_prompts(self) -> bool {
        self == Self::Direct
    }
}

/// Render changes as `export NAME="value";` / `unset NAME;` lines
pub fn render_eval(changes: &[EnvChange]) -> String {
    changes
        .iter()
        .map(|change| match change {
            EnvChange::Set(name, value) => {
                format!("export {name}=\"{}\";\n", escape_double_quoted(value))
            }
            EnvChange::Unset(name) => format!("unset {name};\n"),
        })
        .collect()
}

pub fn write_eval(changes: &[EnvChange], out: &mut impl Write) -> io::Result<()> {
    out.write_all(render_eval(changes).as_bytes())?;
    out.flush()
}

/// Apply changes to an in-memory environment
pub fn apply(changes: &[EnvChange], env: &mut HashMap<String, String>) {
    for change in changes {
        match change {
            EnvChange::Set(name, value) => {
                env.insert((*name).to_string(), value.clone());
            }
            EnvChange::Unset(name) => {
                env.remove(*name);
            }
        }
    }
}

fn apply_to_command(changes: &[EnvChange], cmd: &mut Command) {
    for change in changes {
        match change {
            EnvChange::Set(name, value) => {
                cmd.env(name, value);
            }
            EnvChange::Unset(name) => {
                cmd.env_remove(name);
            }
        }
    }
}

/// Run the user's shell with `changes` applied and wait for it to exit
pub async fn spawn_shell(changes: &[EnvChange]) -> Result<ExitStatus> {
    let shell = env::var("SHELL").unwrap_or_else(|_| FALLBACK_SHELL.to_string());
    info!("Starting {} with assumed credentials", shell);

    let mut cmd = Command::new(&shell);
    apply_to_command(changes, &mut cmd);
    cmd.env(SHELL_MARKER, "1");

    let status = cmd
        .status()
        .await
        .with_context(|| format!("Failed to start shell: {shell}"))?;

    debug!("Shell exited with {}", status);
    Ok(status)
}

/// Escape for a double-quoted POSIX shell word
fn escape_double_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
