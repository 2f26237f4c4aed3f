use std::{env, path::PathBuf};

use dirs;

/// AWS configuration directory name
pub const AWS_CONFIG_DIR_NAME: &str = ".aws";

/// AWS configuration file name
pub const AWS_CONFIG_FILE_NAME: &str = "config";

/// AWS shared credentials file name
pub const AWS_CREDENTIALS_FILE_NAME: &str = "credentials";

/// Account alias file name under the AWS configuration directory
pub const ACCOUNTS_FILE_NAME: &str = "accounts";

/// Profile used as identity source when none is configured
pub const DEFAULT_PROFILE: &str = "default";

/// Role offered by the interactive prompt
pub const DEFAULT_ROLE: &str = "read";

/// Region offered by the interactive prompt
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Requested bastion session lifetime in seconds (12h)
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 43_200;

/// Requested role session lifetime in seconds (1h)
pub const DEFAULT_ROLE_SESSION_TIMEOUT_SECS: u64 = 3_600;

/// STS lower bound for any requested duration
pub const MIN_SESSION_TIMEOUT_SECS: u64 = 900;

/// STS ceiling for GetSessionToken with IAM user credentials (36h)
pub const MAX_SESSION_TIMEOUT_SECS: u64 = 129_600;

/// STS ceiling for AssumeRole (12h)
pub const MAX_ROLE_SESSION_TIMEOUT_SECS: u64 = 43_200;

/// A bastion session is renewed this many seconds before it actually expires
pub const SESSION_GRACE_SECS: u64 = 200;

/// Upper bound for a single STS/IAM call
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// External tool switching the active profile for `parent:child` accounts
pub const DEFAULT_DELEGATION_TOOL: &str = "aws-profile-switch";

/// Shell started in direct mode when `SHELL` is unset
pub const FALLBACK_SHELL: &str = "/bin/sh";

/// Get the AWS config file path
/// Respects AWS_CONFIG_FILE environment variable if set
pub fn get_aws_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("AWS_CONFIG_FILE") {
        return Some(PathBuf::from(path));
    }

    dirs::home_dir().map(|home| home.join(AWS_CONFIG_DIR_NAME).join(AWS_CONFIG_FILE_NAME))
}

/// Get the AWS credentials file path
/// Respects AWS_SHARED_CREDENTIALS_FILE environment variable if set
pub fn get_aws_credentials_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("AWS_SHARED_CREDENTIALS_FILE") {
        return Some(PathBuf::from(path));
    }

    dirs::home_dir().map(|home| {
        home.join(AWS_CONFIG_DIR_NAME)
            .join(AWS_CREDENTIALS_FILE_NAME)
    })
}

/// Default location of the account alias file (~/.aws/accounts)
pub fn default_accounts_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(AWS_CONFIG_DIR_NAME).join(ACCOUNTS_FILE_NAME))
}
