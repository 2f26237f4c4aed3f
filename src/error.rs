use std::path::PathBuf;

use crate::aws::ProviderError;

/// Result type for credential broker operations
pub type Result<T> = std::result::Result<T, AssumeRoleError>;

/// Every way an `assume-role` invocation can fail. None of these is retried.
#[derive(Debug, thiserror::Error)]
pub enum AssumeRoleError {
    #[error("Required AWS setup is missing: no shared config or credentials file at {0}")]
    MissingDependency(PathBuf),

    #[error("'parent:child' account syntax requires '{tool}' on PATH")]
    MissingDelegationTool { tool: String },

    #[error("Switching to parent profile '{parent}' failed: {reason}")]
    DelegationFailed { parent: String, reason: String },

    #[error("'{0}' is not a valid 12-digit AWS account id")]
    InvalidAccountId(String),

    #[error("Role not specified")]
    MissingRole,

    #[error("Region not specified and none configured")]
    MissingRegion,

    #[error("An MFA token is required to start a new session")]
    MissingMfaToken,

    #[error("Failed to look up the MFA device for profile '{profile}'")]
    MfaDeviceLookupFailed {
        profile: String,
        #[source]
        source: ProviderError,
    },

    #[error("MFA code was rejected")]
    InvalidMfaCode,

    #[error("Failed to obtain a bastion session")]
    SessionRequestFailed(#[source] ProviderError),

    #[error("Failed to assume role {role_arn}")]
    RoleAssumptionFailed {
        role_arn: String,
        #[source]
        source: ProviderError,
    },

    #[error("No role session to export")]
    ExportFailed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read input: {0}")]
    Prompt(String),
}
