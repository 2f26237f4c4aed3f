use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, builder::FalseyValueParser};

use crate::{
    commands::{AssumeCommand, CompletionsCommand, InitCommand, UnassumeCommand},
    config::ConfigArgs,
};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "assume-role",
    version,
    about = "Assume AWS IAM roles from an MFA-backed bastion session",
    long_about = None,
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(flatten)]
    pub assume: AssumeCommand,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[arg(short = 'v', long, global = true, action = ArgAction::Count, help = "Increase verbosity (-v info, -vv debug, -vvv trace)")]
    pub verbose: u8,

    #[arg(
        long,
        global = true,
        env = "AWS_ASSUME_ROLE_DEBUG",
        value_parser = FalseyValueParser::new(),
        help = "Debug logging, same as -vv"
    )]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(about = "Print statements that drop the assumed role and restore saved keys")]
    Unassume(UnassumeCommand),
    #[command(about = "Interactive setup (not supported)")]
    Init(InitCommand),
    #[command(about = "Generate shell completion scripts for assume-role")]
    Completions(CompletionsCommand),
}

impl Cli {
    /// Verbosity after folding in `--debug`
    pub fn log_level(&self) -> u8 {
        if self.debug {
            self.verbose.max(2)
        } else {
            self.verbose
        }
    }

    pub async fn execute(self) -> Result<()> {
        match self.command {
            None => self.assume.execute(&self.config).await,
            Some(Commands::Unassume(cmd)) => cmd.execute(),
            Some(Commands::Init(cmd)) => cmd.execute(),
            Some(Commands::Completions(cmd)) => {
                cmd.execute();
                Ok(())
            }
        }
    }
}
