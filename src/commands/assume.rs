use std::io;

use anyhow::{Context, Result};
use aws_smithy_types::date_time::Format;
use chrono::Utc;
use clap::Args;
use tracing::{debug, info};

use crate::{
    accounts::AccountAliases,
    aws::sts::AwsProvider,
    broker::Broker,
    config::{Config, ConfigArgs},
    constants,
    error::AssumeRoleError,
    export::{self, Delivery},
    prompt::{NoPrompt, Prompt, TerminalPrompt},
    resolver::{EnvRegions, ExternalSwitcher, RawInputs, Resolver},
    session::{EnvChange, SessionContext},
};

#[derive(Debug, Clone, Default, Args)]
pub struct AssumeCommand {
    #[arg(help = "Account alias or 12-digit id; 'parent:child' goes through the parent profile")]
    pub account: Option<String>,

    #[arg(help = "Role to assume [prompt default: read]")]
    pub role: Option<String>,

    #[arg(help = "Current code from the MFA device")]
    pub mfa_token: Option<String>,

    #[arg(help = "AWS region for the role session")]
    pub region: Option<String>,

    #[arg(long, help = "Print export statements even when stdout is a terminal")]
    pub eval: bool,
}

impl AssumeCommand {
    pub async fn execute(self, config_args: &ConfigArgs) -> Result<()> {
        let delivery = Delivery::detect(self.eval);
        debug!("Delivery mode: {:?}", delivery);

        let mut ctx = SessionContext::from_process_env();
        ctx.stash_static_keys();

        let result = self.run(&mut ctx, config_args, delivery).await;

        match settle(&mut ctx, result) {
            Ok(changes) => {
                if let Some(role) = &ctx.role {
                    eprintln!(
                        "Assumed role {} in account {} ({}), region {}",
                        role.role, role.account_name, role.account_id, role.region
                    );
                    if let Some(expiration) = role.credentials.expiration {
                        eprintln!(
                            "Credentials will expire at: {}",
                            expiration
                                .fmt(Format::DateTime)
                                .unwrap_or_else(|_| "unknown".to_string())
                        );
                    }
                }
                deliver(delivery, &changes).await
            }
            Err((teardown, error)) => {
                // `eval` of the teardown leaves the caller fully un-assumed
                if delivery == Delivery::Eval {
                    export::write_eval(&teardown, &mut io::stdout().lock())
                        .context("Failed to write teardown statements")?;
                }
                Err(error.into())
            }
        }
    }

    fn raw_inputs(&self) -> RawInputs {
        RawInputs {
            account: self.account.clone(),
            role: self.role.clone(),
            mfa_token: self.mfa_token.clone(),
            region: self.region.clone(),
        }
    }

    async fn run(
        &self,
        ctx: &mut SessionContext,
        config_args: &ConfigArgs,
        delivery: Delivery,
    ) -> Result<(), AssumeRoleError> {
        let config = Config::load(config_args)?;
        check_shared_files()?;

        let aliases = config
            .accounts_file
            .as_deref()
            .map(AccountAliases::load)
            .unwrap_or_default();

        let prompt: Box<dyn Prompt> = if delivery.allows_prompts() {
            Box::new(TerminalPrompt::default())
        } else {
            Box::new(NoPrompt)
        };

        let switcher = ExternalSwitcher {
            tool: config.delegation_tool.clone(),
        };
        let resolver = Resolver {
            config: &config,
            aliases: &aliases,
            prompt: prompt.as_ref(),
            switcher: &switcher,
        };
        let inputs = resolver
            .resolve(self.raw_inputs(), &EnvRegions::from_process_env())
            .await?;

        let provider = AwsProvider::new(&inputs.region, config.api_timeout);
        let broker = Broker {
            config: &config,
            provider: &provider,
            prompt: prompt.as_ref(),
        };

        broker.assume(ctx, &inputs, Utc::now().timestamp()).await
    }
}

/// Changes to deliver for a finished assumption. Any failure, including
/// having nothing to export, turns into a full teardown.
pub fn settle(
    ctx: &mut SessionContext,
    result: Result<(), AssumeRoleError>,
) -> Result<Vec<EnvChange>, (Vec<EnvChange>, AssumeRoleError)> {
    match result.and_then(|()| ctx.exports()) {
        Ok(changes) => Ok(changes),
        Err(error) => {
            info!("Assumption failed, tearing down: {}", error);
            Err((ctx.teardown(), error))
        }
    }
}

async fn deliver(delivery: Delivery, changes: &[EnvChange]) -> Result<()> {
    match delivery {
        Delivery::Eval => export::write_eval(changes, &mut io::stdout().lock())
            .context("Failed to write export statements"),
        Delivery::Direct => {
            eprintln!("Starting a shell with the assumed role; exit it to unassume.");
            let status = export::spawn_shell(changes).await?;
            if !status.success() {
                debug!("Shell exited unsuccessfully: {}", status);
            }
            Ok(())
        }
    }
}

/// Profile calls read the shared config and credentials files
fn check_shared_files() -> Result<(), AssumeRoleError> {
    let credentials = constants::get_aws_credentials_path();
    let config = constants::get_aws_config_path();

    if [&credentials, &config]
        .into_iter()
        .flatten()
        .any(|path| path.exists())
    {
        return Ok(());
    }

    Err(AssumeRoleError::MissingDependency(
        credentials.unwrap_or_default(),
    ))
}
