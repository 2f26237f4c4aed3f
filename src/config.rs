use std::{collections::HashMap, path::PathBuf, time::Duration};

use clap::{Args, ValueEnum, builder::FalseyValueParser};
use ini::Ini;
use tracing::debug;

use crate::{
    constants::{
        self, DEFAULT_API_TIMEOUT_SECS, DEFAULT_DELEGATION_TOOL, DEFAULT_PROFILE,
        DEFAULT_ROLE_SESSION_TIMEOUT_SECS, DEFAULT_SESSION_TIMEOUT_SECS,
        MAX_ROLE_SESSION_TIMEOUT_SECS, MAX_SESSION_TIMEOUT_SECS, MIN_SESSION_TIMEOUT_SECS,
        SESSION_GRACE_SECS,
    },
    error::{AssumeRoleError, Result},
};

/// How the target role is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthScheme {
    /// MFA once into a bastion session, then assume roles from it
    Bastion,
    /// Assume roles straight from the profile's long-lived keys, MFA every call
    Root,
}

/// Settings given as flags or environment variables. Each one overrides
/// the AWS config file, which overrides the built-in default.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    #[arg(
        short = 'p',
        long,
        global = true,
        env = "AWS_PROFILE_ASSUME_ROLE",
        help = "Profile holding the long-lived identity [default: default]"
    )]
    pub profile: Option<String>,

    #[arg(
        long,
        global = true,
        value_enum,
        env = "AWS_ASSUME_ROLE_AUTH_SCHEME",
        help = "Authentication flow [default: bastion]"
    )]
    pub auth_scheme: Option<AuthScheme>,

    #[arg(
        long,
        global = true,
        env = "AWS_ASSUME_ROLE_NO_BASTION",
        value_parser = FalseyValueParser::new(),
        help = "Assume roles directly from the profile (same as --auth-scheme root)"
    )]
    pub no_bastion: bool,

    #[arg(
        long,
        global = true,
        value_name = "SECONDS",
        env = "AWS_SESSION_TIMEOUT",
        help = "Requested bastion session lifetime [default: 43200]"
    )]
    pub session_timeout: Option<u64>,

    #[arg(
        long,
        global = true,
        value_name = "SECONDS",
        env = "AWS_ROLE_SESSION_TIMEOUT",
        help = "Requested role session lifetime, at most 43200 [default: 3600]"
    )]
    pub role_session_timeout: Option<u64>,

    #[arg(
        long,
        global = true,
        env = "AWS_MFA_SERIAL",
        help = "MFA device ARN, skips the device lookup"
    )]
    pub mfa_serial: Option<String>,

    #[arg(
        long,
        global = true,
        env = "AWS_USERNAME",
        help = "IAM user whose MFA device is looked up"
    )]
    pub mfa_username: Option<String>,

    #[arg(
        long,
        global = true,
        env = "AWS_ACCOUNTS_FILE",
        help = "JSON file mapping account aliases to ids [default: ~/.aws/accounts]"
    )]
    pub accounts_file: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "AWS_ASSUME_ROLE_DELEGATION_TOOL",
        help = "Profile switcher used for parent:child accounts"
    )]
    pub delegation_tool: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "SECONDS",
        env = "AWS_ASSUME_ROLE_API_TIMEOUT",
        help = "Timeout for each AWS call [default: 30]"
    )]
    pub api_timeout: Option<u64>,
}

/// Profile sections of the AWS config file, keyed by profile name
#[derive(Debug, Clone, Default)]
pub struct ProfileSettings {
    profiles: HashMap<String, HashMap<String, String>>,
}

impl ProfileSettings {
    pub fn load() -> Self {
        let Some(path) = constants::get_aws_config_path() else {
            return Self::default();
        };

        match Ini::load_from_file(&path) {
            Ok(ini) => Self::from_ini(&ini),
            Err(e) => {
                debug!("AWS config not loaded from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn from_ini(ini: &Ini) -> Self {
        let profiles = ini
            .iter()
            .filter_map(|(section, props)| {
                let section = section?;
                let name = section
                    .strip_prefix("profile ")
                    .unwrap_or(section)
                    .trim()
                    .to_string();
                let values = props
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                Some((name, values))
            })
            .collect();

        Self { profiles }
    }

    pub fn get(&self, profile: &str, key: &str) -> Option<&str> {
        self.profiles
            .get(profile)?
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn region(&self, profile: &str) -> Option<&str> {
        self.get(profile, "region")
    }

    pub fn mfa_serial(&self, profile: &str) -> Option<&str> {
        self.get(profile, "mfa_serial")
    }
}

/// Fully resolved, validated settings for one invocation
#[derive(Debug, Clone)]
pub struct Config {
    pub profile: String,
    pub auth_scheme: AuthScheme,
    pub session_timeout: Duration,
    pub role_session_timeout: Duration,
    /// Flag/env override; otherwise `mfa_serial` of the profile in use
    pub mfa_serial: Option<String>,
    pub mfa_username: Option<String>,
    pub accounts_file: Option<PathBuf>,
    pub delegation_tool: String,
    pub api_timeout: Duration,
    pub settings: ProfileSettings,
}

impl Config {
    pub fn load(args: &ConfigArgs) -> Result<Self> {
        Self::resolve(args, ProfileSettings::load())
    }

    pub fn resolve(args: &ConfigArgs, settings: ProfileSettings) -> Result<Self> {
        let profile = args
            .profile
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());

        let from_file = |key: &str| settings.get(&profile, key).map(str::to_string);

        let auth_scheme = if args.no_bastion {
            AuthScheme::Root
        } else if let Some(scheme) = args.auth_scheme {
            scheme
        } else if let Some(value) = from_file("assume_role_auth_scheme") {
            AuthScheme::from_str(&value, true).map_err(|_| {
                AssumeRoleError::InvalidConfig(format!(
                    "assume_role_auth_scheme must be 'bastion' or 'root', got '{value}'"
                ))
            })?
        } else {
            AuthScheme::Bastion
        };

        let session_timeout = seconds(
            args.session_timeout,
            from_file("assume_role_session_timeout"),
            "assume_role_session_timeout",
            DEFAULT_SESSION_TIMEOUT_SECS,
        )?;
        let role_session_timeout = seconds(
            args.role_session_timeout,
            from_file("assume_role_role_session_timeout"),
            "assume_role_role_session_timeout",
            DEFAULT_ROLE_SESSION_TIMEOUT_SECS,
        )?;
        let api_timeout = seconds(args.api_timeout, None, "", DEFAULT_API_TIMEOUT_SECS)?;

        let accounts_file = args
            .accounts_file
            .clone()
            .or_else(|| from_file("assume_role_accounts_file").map(PathBuf::from))
            .or_else(constants::default_accounts_path);

        let config = Self {
            profile,
            auth_scheme,
            session_timeout,
            role_session_timeout,
            mfa_serial: args.mfa_serial.clone(),
            mfa_username: args.mfa_username.clone(),
            accounts_file,
            delegation_tool: args
                .delegation_tool
                .clone()
                .unwrap_or_else(|| DEFAULT_DELEGATION_TOOL.to_string()),
            api_timeout,
            settings,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let session = self.session_timeout.as_secs();
        if !(MIN_SESSION_TIMEOUT_SECS..=MAX_SESSION_TIMEOUT_SECS).contains(&session) {
            return Err(AssumeRoleError::InvalidConfig(format!(
                "session timeout must be between {MIN_SESSION_TIMEOUT_SECS} and {MAX_SESSION_TIMEOUT_SECS} seconds, got {session}"
            )));
        }
        if session <= SESSION_GRACE_SECS {
            return Err(AssumeRoleError::InvalidConfig(format!(
                "session timeout must exceed the {SESSION_GRACE_SECS}s renewal margin"
            )));
        }

        let role_session = self.role_session_timeout.as_secs();
        if !(MIN_SESSION_TIMEOUT_SECS..=MAX_ROLE_SESSION_TIMEOUT_SECS).contains(&role_session) {
            return Err(AssumeRoleError::InvalidConfig(format!(
                "role session timeout must be between {MIN_SESSION_TIMEOUT_SECS} and {MAX_ROLE_SESSION_TIMEOUT_SECS} seconds, got {role_session}"
            )));
        }

        if self.api_timeout.is_zero() {
            return Err(AssumeRoleError::InvalidConfig(
                "API timeout must be at least 1 second".to_string(),
            ));
        }

        Ok(())
    }
}

fn seconds(flag: Option<u64>, file: Option<String>, key: &str, default: u64) -> Result<Duration> {
    let secs = match (flag, file) {
        (Some(secs), _) => secs,
        (None, Some(value)) => value.trim().parse().map_err(|_| {
            AssumeRoleError::InvalidConfig(format!("{key} must be a number of seconds, got '{value}'"))
        })?,
        (None, None) => default,
    };
    Ok(Duration::from_secs(secs))
}
