//! Turns positional arguments, environment and config into the fully
//! resolved inputs of one assumption.

use std::{
    env, io,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{
    accounts::AccountAliases,
    aws::roles::is_valid_account_id,
    config::Config,
    constants::{DEFAULT_AWS_REGION, DEFAULT_ROLE},
    error::{AssumeRoleError, Result},
    prompt::Prompt,
    session::vars,
};

/// Positional arguments as given
#[derive(Debug, Clone, Default)]
pub struct RawInputs {
    pub account: Option<String>,
    pub role: Option<String>,
    pub mfa_token: Option<String>,
    pub region: Option<String>,
}

/// Region variables of the calling environment
#[derive(Debug, Clone, Default)]
pub struct EnvRegions {
    pub aws_region: Option<String>,
    pub aws_default_region: Option<String>,
}

impl EnvRegions {
    pub fn from_process_env() -> Self {
        Self {
            aws_region: env::var(vars::REGION).ok(),
            aws_default_region: env::var(vars::DEFAULT_REGION).ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInputs {
    pub account_id: String,
    /// The name as typed (alias or id), exported as AWS_ACCOUNT_NAME
    pub account_name: String,
    pub role: String,
    pub mfa_token: Option<String>,
    pub region: String,
    /// Profile providing the long-lived identity
    pub profile: String,
}

/// Switches the active profile to the parent of a `parent:child` account
#[async_trait]
pub trait ProfileSwitcher: Send + Sync {
    async fn switch(&self, parent: &str) -> Result<()>;
}

/// Runs the external profile switcher found on PATH
#[derive(Debug, Clone)]
pub struct ExternalSwitcher {
    pub tool: String,
}

impl ExternalSwitcher {
    fn locate(&self) -> Option<PathBuf> {
        let candidate = PathBuf::from(&self.tool);
        if candidate.components().count() > 1 {
            return is_executable(&candidate).then_some(candidate);
        }

        env::var_os("PATH").and_then(|paths| {
            env::split_paths(&paths)
                .map(|dir| dir.join(&self.tool))
                .find(|path| is_executable(path))
        })
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[async_trait]
impl ProfileSwitcher for ExternalSwitcher {
    async fn switch(&self, parent: &str) -> Result<()> {
        let tool = self
            .locate()
            .ok_or_else(|| AssumeRoleError::MissingDelegationTool {
                tool: self.tool.clone(),
            })?;

        info!("Switching to parent profile {} with {}", parent, tool.display());

        // The switcher may print; keep it off stdout
        let status = Command::new(&tool)
            .arg(parent)
            .stdout(Stdio::from(io::stderr()))
            .status()
            .await
            .map_err(|e| AssumeRoleError::DelegationFailed {
                parent: parent.to_string(),
                reason: e.to_string(),
            })?;

        if !status.success() {
            return Err(AssumeRoleError::DelegationFailed {
                parent: parent.to_string(),
                reason: format!("{} exited with {}", tool.display(), status),
            });
        }

        Ok(())
    }
}

pub struct Resolver<'a> {
    pub config: &'a Config,
    pub aliases: &'a AccountAliases,
    pub prompt: &'a dyn Prompt,
    pub switcher: &'a dyn ProfileSwitcher,
}

impl Resolver<'_> {
    pub async fn resolve(&self, raw: RawInputs, env: &EnvRegions) -> Result<ResolvedInputs> {
        let (account_name, account_id, profile) = self.resolve_account(raw.account).await?;
        let role = self.resolve_role(raw.role)?;
        let region = self.resolve_region(raw.region, env, &profile)?;

        debug!(
            "Resolved account {} ({}), role {}, region {}, profile {}",
            account_name, account_id, role, region, profile
        );

        Ok(ResolvedInputs {
            account_id,
            account_name,
            role,
            mfa_token: non_empty(raw.mfa_token),
            region,
            profile,
        })
    }

    async fn resolve_account(&self, input: Option<String>) -> Result<(String, String, String)> {
        let input = match non_empty(input) {
            Some(input) => input,
            None => self
                .prompt
                .ask("Assume into account", None)?
                .unwrap_or_default(),
        };

        let (profile, name) = match input.split_once(':') {
            Some((parent, child)) => {
                self.switcher.switch(parent).await?;
                (parent.to_string(), child.to_string())
            }
            None => (self.config.profile.clone(), input),
        };

        let account_id = self.aliases.resolve(&name);
        if !is_valid_account_id(&account_id) {
            return Err(AssumeRoleError::InvalidAccountId(account_id));
        }

        Ok((name, account_id, profile))
    }

    fn resolve_role(&self, input: Option<String>) -> Result<String> {
        if let Some(role) = non_empty(input) {
            return Ok(role);
        }

        self.prompt
            .ask("Assume into role", Some(DEFAULT_ROLE))?
            .ok_or(AssumeRoleError::MissingRole)
    }

    /// Argument, then AWS_REGION, then AWS_DEFAULT_REGION, then the
    /// profile's configured region, then a prompt.
    fn resolve_region(
        &self,
        input: Option<String>,
        env: &EnvRegions,
        profile: &str,
    ) -> Result<String> {
        let configured = non_empty(input)
            .or_else(|| non_empty(env.aws_region.clone()))
            .or_else(|| non_empty(env.aws_default_region.clone()))
            .or_else(|| self.config.settings.region(profile).map(str::to_string));

        if let Some(region) = configured {
            return Ok(region);
        }

        self.prompt
            .ask("Assume into region", Some(DEFAULT_AWS_REGION))?
            .ok_or(AssumeRoleError::MissingRegion)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ini::Ini;
    use serial_test::serial;

    use super::*;
    use crate::{
        config::{ConfigArgs, ProfileSettings},
        prompt::{NoPrompt, scripted::ScriptedPrompt},
    };

    #[derive(Default)]
    struct RecordingSwitcher {
        switched: Mutex<Vec<String>>,
        missing: bool,
    }

    #[async_trait]
    impl ProfileSwitcher for RecordingSwitcher {
        async fn switch(&self, parent: &str) -> Result<()> {
            if self.missing {
                return Err(AssumeRoleError::MissingDelegationTool {
                    tool: "aws-profile-switch".to_string(),
                });
            }
            self.switched.lock().unwrap().push(parent.to_string());
            Ok(())
        }
    }

    fn config_with(ini: &str) -> Config {
        let settings = ProfileSettings::from_ini(&Ini::load_from_str(ini).unwrap());
        Config::resolve(&ConfigArgs::default(), settings).unwrap()
    }

    fn aliases() -> AccountAliases {
        AccountAliases::parse(r#"{"prod": "123456789012", "ops": "210987654321"}"#).unwrap()
    }

    fn raw(account: &str, role: &str, region: &str) -> RawInputs {
        let opt = |s: &str| (!s.is_empty()).then(|| s.to_string());
        RawInputs {
            account: opt(account),
            role: opt(role),
            mfa_token: None,
            region: opt(region),
        }
    }

    #[tokio::test]
    async fn test_alias_is_substituted() {
        let config = config_with("");
        let aliases = aliases();
        let switcher = RecordingSwitcher::default();
        let resolver = Resolver {
            config: &config,
            aliases: &aliases,
            prompt: &NoPrompt,
            switcher: &switcher,
        };

        let resolved = resolver
            .resolve(raw("prod", "admin", "us-west-2"), &EnvRegions::default())
            .await
            .unwrap();
        assert_eq!(resolved.account_id, "123456789012");
        assert_eq!(resolved.account_name, "prod");
        assert_eq!(resolved.profile, "default");
    }

    #[tokio::test]
    async fn test_literal_id_passes_through() {
        let config = config_with("");
        let aliases = aliases();
        let switcher = RecordingSwitcher::default();
        let resolver = Resolver {
            config: &config,
            aliases: &aliases,
            prompt: &NoPrompt,
            switcher: &switcher,
        };

        for id in ["000000000001", "999999999999", "555566667777"] {
            let resolved = resolver
                .resolve(raw(id, "read", "us-east-1"), &EnvRegions::default())
                .await
                .unwrap();
            assert_eq!(resolved.account_id, id);
        }
    }

    #[tokio::test]
    async fn test_invalid_ids_are_rejected() {
        let config = config_with("");
        let aliases = aliases();
        let switcher = RecordingSwitcher::default();
        let resolver = Resolver {
            config: &config,
            aliases: &aliases,
            prompt: &NoPrompt,
            switcher: &switcher,
        };

        for input in ["staging", "12345", "1234567890123", "12345678901x"] {
            let result = resolver
                .resolve(raw(input, "read", "us-east-1"), &EnvRegions::default())
                .await;
            assert!(
                matches!(result, Err(AssumeRoleError::InvalidAccountId(_))),
                "{input} should be rejected"
            );
        }

        let result = resolver.resolve(raw("", "read", "us-east-1"), &EnvRegions::default()).await;
        assert!(matches!(result, Err(AssumeRoleError::InvalidAccountId(_))));
    }

    #[tokio::test]
    async fn test_parent_child_switches_profile() {
        let config = config_with("");
        let aliases = aliases();
        let switcher = RecordingSwitcher::default();
        let resolver = Resolver {
            config: &config,
            aliases: &aliases,
            prompt: &NoPrompt,
            switcher: &switcher,
        };

        let resolved = resolver
            .resolve(raw("corp:ops", "read", "us-east-1"), &EnvRegions::default())
            .await
            .unwrap();
        assert_eq!(resolved.profile, "corp");
        assert_eq!(resolved.account_name, "ops");
        assert_eq!(resolved.account_id, "210987654321");
        assert_eq!(*switcher.switched.lock().unwrap(), vec!["corp".to_string()]);
    }

    #[tokio::test]
    async fn test_parent_child_without_tool_fails() {
        let config = config_with("");
        let aliases = aliases();
        let switcher = RecordingSwitcher {
            missing: true,
            ..Default::default()
        };
        let resolver = Resolver {
            config: &config,
            aliases: &aliases,
            prompt: &NoPrompt,
            switcher: &switcher,
        };

        let result = resolver
            .resolve(raw("corp:ops", "read", "us-east-1"), &EnvRegions::default())
            .await;
        assert!(matches!(
            result,
            Err(AssumeRoleError::MissingDelegationTool { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_role_in_eval_mode() {
        let config = config_with("");
        let aliases = aliases();
        let switcher = RecordingSwitcher::default();
        let resolver = Resolver {
            config: &config,
            aliases: &aliases,
            prompt: &NoPrompt,
            switcher: &switcher,
        };

        let result = resolver.resolve(raw("prod", "", "us-east-1"), &EnvRegions::default()).await;
        assert!(matches!(result, Err(AssumeRoleError::MissingRole)));
    }

    #[tokio::test]
    async fn test_role_prompt_defaults_to_read() {
        let config = config_with("");
        let aliases = aliases();
        let switcher = RecordingSwitcher::default();
        let prompt = ScriptedPrompt::new(&[""]);
        let resolver = Resolver {
            config: &config,
            aliases: &aliases,
            prompt: &prompt,
            switcher: &switcher,
        };

        let resolved = resolver
            .resolve(raw("prod", "", "us-east-1"), &EnvRegions::default())
            .await
            .unwrap();
        assert_eq!(resolved.role, "read");
        assert_eq!(*prompt.asked.borrow(), vec!["Assume into role".to_string()]);
    }

    #[tokio::test]
    async fn test_explicit_region_beats_environment() {
        let config = config_with("[default]\nregion = ap-south-1\n");
        let aliases = aliases();
        let switcher = RecordingSwitcher::default();
        let resolver = Resolver {
            config: &config,
            aliases: &aliases,
            prompt: &NoPrompt,
            switcher: &switcher,
        };
        let env = EnvRegions {
            aws_region: Some("us-west-2".to_string()),
            aws_default_region: Some("ca-central-1".to_string()),
        };

        let resolved = resolver.resolve(raw("prod", "read", "eu-west-1"), &env).await.unwrap();
        assert_eq!(resolved.region, "eu-west-1");
    }

    #[tokio::test]
    async fn test_region_fallback_chain() {
        let config = config_with("[default]\nregion = ap-south-1\n");
        let aliases = aliases();
        let switcher = RecordingSwitcher::default();
        let resolver = Resolver {
            config: &config,
            aliases: &aliases,
            prompt: &NoPrompt,
            switcher: &switcher,
        };

        let env = EnvRegions {
            aws_region: Some("us-west-2".to_string()),
            aws_default_region: Some("ca-central-1".to_string()),
        };
        let resolved = resolver.resolve(raw("prod", "read", ""), &env).await.unwrap();
        assert_eq!(resolved.region, "us-west-2");

        let env = EnvRegions {
            aws_region: None,
            aws_default_region: Some("ca-central-1".to_string()),
        };
        let resolved = resolver.resolve(raw("prod", "read", ""), &env).await.unwrap();
        assert_eq!(resolved.region, "ca-central-1");

        let resolved = resolver
            .resolve(raw("prod", "read", ""), &EnvRegions::default())
            .await
            .unwrap();
        assert_eq!(resolved.region, "ap-south-1");
    }

    #[tokio::test]
    async fn test_missing_region_in_eval_mode() {
        let config = config_with("");
        let aliases = aliases();
        let switcher = RecordingSwitcher::default();
        let resolver = Resolver {
            config: &config,
            aliases: &aliases,
            prompt: &NoPrompt,
            switcher: &switcher,
        };

        let result = resolver.resolve(raw("prod", "read", ""), &EnvRegions::default()).await;
        assert!(matches!(result, Err(AssumeRoleError::MissingRegion)));
    }

    #[tokio::test]
    async fn test_region_prompt_defaults_to_us_east_1() {
        let config = config_with("");
        let aliases = aliases();
        let switcher = RecordingSwitcher::default();
        let prompt = ScriptedPrompt::new(&[""]);
        let resolver = Resolver {
            config: &config,
            aliases: &aliases,
            prompt: &prompt,
            switcher: &switcher,
        };

        let resolved = resolver
            .resolve(raw("prod", "read", ""), &EnvRegions::default())
            .await
            .unwrap();
        assert_eq!(resolved.region, "us-east-1");
    }

    #[tokio::test]
    async fn test_external_switcher_reports_missing_tool() {
        let switcher = ExternalSwitcher {
            tool: "assume-role-test-switcher-that-does-not-exist".to_string(),
        };
        let result = switcher.switch("corp").await;
        assert!(matches!(
            result,
            Err(AssumeRoleError::MissingDelegationTool { .. })
        ));
    }

    #[cfg(unix)]
    fn write_tool(dir: &Path, name: &str, body: &str, mode: u32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn test_external_switcher_skips_non_executable_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let tool = write_tool(dir.path(), "switch", "#!/bin/sh\nexit 0\n", 0o644);
        let switcher = ExternalSwitcher {
            tool: tool.display().to_string(),
        };

        let result = switcher.switch("corp").await;
        assert!(matches!(
            result,
            Err(AssumeRoleError::MissingDelegationTool { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn test_external_switcher_runs_tool() {
        let dir = tempfile::TempDir::new().unwrap();
        let ok = write_tool(dir.path(), "ok", "#!/bin/sh\nexit 0\n", 0o755);
        let failing = write_tool(dir.path(), "failing", "#!/bin/sh\nexit 3\n", 0o755);

        let switcher = ExternalSwitcher {
            tool: ok.display().to_string(),
        };
        assert!(switcher.switch("corp").await.is_ok());

        let switcher = ExternalSwitcher {
            tool: failing.display().to_string(),
        };
        let result = switcher.switch("corp").await;
        assert!(matches!(
            result,
            Err(AssumeRoleError::DelegationFailed { ref parent, .. }) if parent == "corp"
        ));
    }
}
