use std::time::Duration;

use async_trait::async_trait;
use aws_smithy_types::DateTime;

pub mod roles;
pub mod sts;

/// AWS temporary credentials structure
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    /// Unknown when the credentials were read back from the environment
    pub expiration: Option<DateTime>,
}

/// Identity a provider call is signed with
#[derive(Debug, Clone)]
pub enum CallerIdentity {
    /// Long-lived keys of a named profile in the shared credential files
    Profile(String),
    /// Temporary credentials of an active bastion session
    Session(Credentials),
}

/// MFA device serial and the one-time code read from it
#[derive(Debug, Clone)]
pub struct MfaCode {
    pub serial_number: String,
    pub token_code: String,
}

#[derive(Debug, Clone)]
pub struct SessionTokenRequest {
    pub mfa: MfaCode,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub session_name: String,
    pub external_id: Option<String>,
    pub duration: Duration,
    /// Only set when the caller is a long-lived profile (no bastion session)
    pub mfa: Option<MfaCode>,
}

/// Failures reported by a credential provider, classified from the
/// structured error code rather than the message text.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("the MFA code was rejected")]
    InvalidMfaCode,

    #[error("no MFA device registered for this identity")]
    NoMfaDevice,

    #[error("call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("{operation} failed: {message}")]
    Service {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error("provider returned no credentials")]
    EmptyResponse,
}

/// The seam between the broker and AWS. `sts::AwsProvider` talks to the
/// real service; tests substitute an in-memory implementation.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Serial number (ARN) of the caller's first MFA device
    async fn mfa_device(
        &self,
        caller: &CallerIdentity,
        user_name: Option<&str>,
    ) -> Result<String, ProviderError>;

    /// GetSessionToken: a bastion session authorised by an MFA code
    async fn session_token(
        &self,
        caller: &CallerIdentity,
        request: &SessionTokenRequest,
    ) -> Result<Credentials, ProviderError>;

    /// AssumeRole into the target account
    async fn assume_role(
        &self,
        caller: &CallerIdentity,
        request: &AssumeRoleRequest,
    ) -> Result<Credentials, ProviderError>;
}

pub use roles::RoleTarget;

#[cfg(test)]
pub mod mock {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Scripted provider counting every call it receives
    #[derive(Default)]
    pub struct MockProvider {
        pub device_calls: AtomicUsize,
        pub session_calls: AtomicUsize,
        pub assume_calls: AtomicUsize,
        pub fail_device: bool,
        pub reject_mfa: bool,
        pub fail_session: bool,
        pub fail_assume: bool,
        pub last_assume: Mutex<Option<(String, AssumeRoleRequest)>>,
    }

    pub fn creds(prefix: &str) -> Credentials {
        Credentials {
            access_key_id: format!("{prefix}AKID"),
            secret_access_key: format!("{prefix}SECRET"),
            session_token: format!("{prefix}TOKEN"),
            expiration: None,
        }
    }

    impl MockProvider {
        pub fn device_calls(&self) -> usize {
            self.device_calls.load(Ordering::SeqCst)
        }

        pub fn session_calls(&self) -> usize {
            self.session_calls.load(Ordering::SeqCst)
        }

        pub fn assume_calls(&self) -> usize {
            self.assume_calls.load(Ordering::SeqCst)
        }

        fn service_error(operation: &'static str) -> ProviderError {
            ProviderError::Service {
                operation,
                code: Some("AccessDenied".to_string()),
                message: "mock failure".to_string(),
            }
        }
    }

    #[async_trait]
    impl CredentialProvider for MockProvider {
        async fn mfa_device(
            &self,
            _caller: &CallerIdentity,
            _user_name: Option<&str>,
        ) -> Result<String, ProviderError> {
            self.device_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_device {
                return Err(ProviderError::NoMfaDevice);
            }
            Ok("arn:aws:iam::999999999999:mfa/alice".to_string())
        }

        async fn session_token(
            &self,
            _caller: &CallerIdentity,
            _request: &SessionTokenRequest,
        ) -> Result<Credentials, ProviderError> {
            self.session_calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_mfa {
                return Err(ProviderError::InvalidMfaCode);
            }
            if self.fail_session {
                return Err(Self::service_error("GetSessionToken"));
            }
            Ok(creds("SESSION"))
        }

        async fn assume_role(
            &self,
            caller: &CallerIdentity,
            request: &AssumeRoleRequest,
        ) -> Result<Credentials, ProviderError> {
            self.assume_calls.fetch_add(1, Ordering::SeqCst);
            let caller_key = match caller {
                CallerIdentity::Profile(profile) => format!("profile:{profile}"),
                CallerIdentity::Session(creds) => creds.access_key_id.clone(),
            };
            *self.last_assume.lock().unwrap() = Some((caller_key, request.clone()));
            if self.fail_assume {
                return Err(Self::service_error("AssumeRole"));
            }
            Ok(creds("ROLE"))
        }
    }
}
