//! Session state carried between invocations through the calling shell's
//! environment: the bastion session, the role session and any long-lived
//! keys saved aside before the first assumption.

use std::{collections::HashMap, env, time::Duration};

use crate::{
    aws::Credentials,
    constants::SESSION_GRACE_SECS,
    error::{AssumeRoleError, Result},
};

/// Environment variable names read and written by the broker
pub mod vars {
    pub const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
    pub const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
    pub const SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
    pub const SECURITY_TOKEN: &str = "AWS_SECURITY_TOKEN";

    pub const ACCOUNT_ID: &str = "AWS_ACCOUNT_ID";
    pub const ACCOUNT_NAME: &str = "AWS_ACCOUNT_NAME";
    pub const ACCOUNT_ROLE: &str = "AWS_ACCOUNT_ROLE";
    pub const REGION: &str = "AWS_REGION";
    pub const DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
    pub const ROLE_SESSION_START: &str = "ROLE_SESSION_START";
    pub const PROFILE: &str = "AWS_PROFILE_ASSUME_ROLE";

    pub const BASTION_ACCESS_KEY_ID: &str = "AWS_SESSION_ACCESS_KEY_ID";
    pub const BASTION_SECRET_ACCESS_KEY: &str = "AWS_SESSION_SECRET_ACCESS_KEY";
    pub const BASTION_SESSION_TOKEN: &str = "AWS_SESSION_SESSION_TOKEN";
    pub const BASTION_SECURITY_TOKEN: &str = "AWS_SESSION_SECURITY_TOKEN";
    pub const BASTION_SESSION_START: &str = "AWS_SESSION_START";

    pub const SAVED_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID_SAVE";
    pub const SAVED_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY_SAVE";

    /// Cleared on every teardown, regardless of what was exported
    pub const SESSION_SCOPED: &[&str] = &[
        SESSION_TOKEN,
        SECURITY_TOKEN,
        ACCOUNT_ID,
        ACCOUNT_NAME,
        ACCOUNT_ROLE,
        ROLE_SESSION_START,
        BASTION_ACCESS_KEY_ID,
        BASTION_SECRET_ACCESS_KEY,
        BASTION_SESSION_TOKEN,
        BASTION_SECURITY_TOKEN,
        BASTION_SESSION_START,
    ];
}

/// One change to the caller's environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvChange {
    Set(&'static str, String),
    Unset(&'static str),
}

/// Long-lived key pair found in the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticKeys {
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    Active,
    Expired,
}

/// Temporary credentials from GetSessionToken, reused until they near expiry
#[derive(Debug, Clone, PartialEq)]
pub struct BastionSession {
    pub credentials: Credentials,
    /// Unix seconds
    pub started_at: i64,
}

impl BastionSession {
    /// Where `session` stands at `now` for a session requested with `timeout`.
    /// Renewal starts `SESSION_GRACE_SECS` before the real expiry.
    pub fn state(session: Option<&Self>, now: i64, timeout: Duration) -> SessionState {
        let Some(session) = session else {
            return SessionState::NoSession;
        };

        let window = i64::try_from(timeout.as_secs())
            .unwrap_or(i64::MAX)
            .saturating_sub(SESSION_GRACE_SECS as i64);

        // A start in the future cannot be trusted
        let elapsed = now.saturating_sub(session.started_at);
        if (0..window).contains(&elapsed) {
            SessionState::Active
        } else {
            SessionState::Expired
        }
    }
}

/// Role-scoped credentials and the metadata exported alongside them
#[derive(Debug, Clone, PartialEq)]
pub struct RoleSession {
    pub credentials: Credentials,
    pub account_id: String,
    pub account_name: String,
    pub role: String,
    pub region: String,
    pub profile: String,
    /// Unix seconds
    pub started_at: i64,
}

/// Everything the broker knows about the caller's sessions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    /// Long-lived keys currently set in the environment
    pub static_keys: Option<StaticKeys>,
    /// Keys put aside before the first assumption, restored on teardown
    pub saved_keys: Option<StaticKeys>,
    pub bastion: Option<BastionSession>,
    pub role: Option<RoleSession>,
    /// The saved keys are still set in the caller's shell
    pub(crate) saved_keys_in_shell: bool,
}

impl SessionContext {
    /// Variables that are not valid UTF-8 are skipped
    pub fn from_process_env() -> Self {
        let vars = env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self::from_vars(&vars)
    }

    /// Rebuild the context from environment variables. Empty values count
    /// as unset.
    pub fn from_vars(env: &HashMap<String, String>) -> Self {
        let get = |name: &str| env.get(name).map(String::as_str).filter(|v| !v.is_empty());

        // Keys paired with a session token are temporary ones we exported
        let static_keys = match (get(vars::ACCESS_KEY_ID), get(vars::SECRET_ACCESS_KEY)) {
            (Some(id), Some(secret)) if get(vars::SESSION_TOKEN).is_none() => Some(StaticKeys {
                access_key_id: id.to_string(),
                secret_access_key: secret.to_string(),
            }),
            _ => None,
        };

        let saved_keys = match (get(vars::SAVED_ACCESS_KEY_ID), get(vars::SAVED_SECRET_ACCESS_KEY)) {
            (Some(id), Some(secret)) => Some(StaticKeys {
                access_key_id: id.to_string(),
                secret_access_key: secret.to_string(),
            }),
            _ => None,
        };

        let bastion = match (
            get(vars::BASTION_ACCESS_KEY_ID),
            get(vars::BASTION_SECRET_ACCESS_KEY),
            get(vars::BASTION_SESSION_TOKEN),
            get(vars::BASTION_SESSION_START).and_then(|s| s.parse::<i64>().ok()),
        ) {
            (Some(id), Some(secret), Some(token), Some(started_at)) => Some(BastionSession {
                credentials: Credentials {
                    access_key_id: id.to_string(),
                    secret_access_key: secret.to_string(),
                    session_token: token.to_string(),
                    expiration: None,
                },
                started_at,
            }),
            _ => None,
        };

        Self {
            static_keys,
            saved_keys,
            bastion,
            role: None,
            saved_keys_in_shell: false,
        }
    }

    /// Put long-lived keys aside so every provider call goes through the
    /// named profile. Newer static keys replace an older saved pair.
    pub fn stash_static_keys(&mut self) {
        if let Some(keys) = self.static_keys.take() {
            tracing::debug!("Saving static keys {} for restore", keys.access_key_id);
            self.saved_keys = Some(keys);
            self.saved_keys_in_shell = true;
        }
    }

    /// Variables to export for the current role session
    pub fn exports(&self) -> Result<Vec<EnvChange>> {
        let role = self.role.as_ref().ok_or(AssumeRoleError::ExportFailed)?;
        let creds = &role.credentials;

        let mut changes = vec![
            EnvChange::Set(vars::ACCESS_KEY_ID, creds.access_key_id.clone()),
            EnvChange::Set(vars::SECRET_ACCESS_KEY, creds.secret_access_key.clone()),
            EnvChange::Set(vars::SESSION_TOKEN, creds.session_token.clone()),
            EnvChange::Set(vars::SECURITY_TOKEN, creds.session_token.clone()),
            EnvChange::Set(vars::ACCOUNT_ID, role.account_id.clone()),
            EnvChange::Set(vars::ACCOUNT_NAME, role.account_name.clone()),
            EnvChange::Set(vars::ACCOUNT_ROLE, role.role.clone()),
            EnvChange::Set(vars::REGION, role.region.clone()),
            EnvChange::Set(vars::DEFAULT_REGION, role.region.clone()),
        ];

        if let Some(bastion) = &self.bastion {
            let session = &bastion.credentials;
            changes.extend([
                EnvChange::Set(vars::BASTION_ACCESS_KEY_ID, session.access_key_id.clone()),
                EnvChange::Set(vars::BASTION_SECRET_ACCESS_KEY, session.secret_access_key.clone()),
                EnvChange::Set(vars::BASTION_SESSION_TOKEN, session.session_token.clone()),
                EnvChange::Set(vars::BASTION_SECURITY_TOKEN, session.session_token.clone()),
                EnvChange::Set(vars::BASTION_SESSION_START, bastion.started_at.to_string()),
            ]);
        }

        if let Some(saved) = &self.saved_keys {
            changes.extend([
                EnvChange::Set(vars::SAVED_ACCESS_KEY_ID, saved.access_key_id.clone()),
                EnvChange::Set(vars::SAVED_SECRET_ACCESS_KEY, saved.secret_access_key.clone()),
            ]);
        }

        changes.extend([
            EnvChange::Set(vars::ROLE_SESSION_START, role.started_at.to_string()),
            EnvChange::Set(vars::PROFILE, role.profile.clone()),
        ]);

        Ok(changes)
    }

    /// Drop every session and restore saved keys. Running it again on the
    /// resulting environment changes nothing.
    pub fn teardown(&mut self) -> Vec<EnvChange> {
        let mut changes: Vec<EnvChange> = vars::SESSION_SCOPED
            .iter()
            .copied()
            .map(EnvChange::Unset)
            .collect();

        match self.saved_keys.take() {
            // Nothing exported yet, so the shell still holds these keys
            Some(saved) if self.saved_keys_in_shell && self.role.is_none() => {
                self.static_keys = Some(saved);
            }
            Some(saved) => {
                changes.extend([
                    EnvChange::Set(vars::ACCESS_KEY_ID, saved.access_key_id.clone()),
                    EnvChange::Set(vars::SECRET_ACCESS_KEY, saved.secret_access_key.clone()),
                ]);
                self.static_keys = Some(saved);
            }
            // Long-lived keys the user set themselves stay untouched
            None if self.static_keys.is_some() => {}
            None => changes.extend([
                EnvChange::Unset(vars::ACCESS_KEY_ID),
                EnvChange::Unset(vars::SECRET_ACCESS_KEY),
            ]),
        }

        changes.extend([
            EnvChange::Unset(vars::SAVED_ACCESS_KEY_ID),
            EnvChange::Unset(vars::SAVED_SECRET_ACCESS_KEY),
        ]);

        self.saved_keys_in_shell = false;
        self.bastion = None;
        self.role = None;
        changes
    }
}
