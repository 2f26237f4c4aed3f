use anyhow::{Result, bail};
use clap::Args;

#[derive(Debug, Clone, Default, Args)]
pub struct InitCommand {}

impl InitCommand {
    pub fn execute(self) -> Result<()> {
        bail!("init is not supported; write ~/.aws/config and the accounts file by hand")
    }
}
