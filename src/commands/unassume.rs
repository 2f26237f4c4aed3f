use std::{env, io};

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use crate::{
    export::{self, SHELL_MARKER},
    session::SessionContext,
};

#[derive(Debug, Clone, Default, Args)]
pub struct UnassumeCommand {}

impl UnassumeCommand {
    /// Print the statements that return the shell to its pre-assume state.
    /// Safe to run any number of times.
    pub fn execute(self) -> Result<()> {
        let mut ctx = SessionContext::from_process_env();
        let changes = ctx.teardown();
        debug!("Unassume produced {} changes", changes.len());

        export::write_eval(&changes, &mut io::stdout().lock())
            .context("Failed to write unassume statements")?;

        if env::var_os(SHELL_MARKER).is_some() {
            eprintln!("This shell was started by assume-role; type `exit` to leave it.");
        } else {
            eprintln!("Role session cleared.");
        }

        Ok(())
    }
}
