use std::{future::Future, time::Duration};

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig, profile::ProfileFileCredentialsProvider};
use aws_sdk_iam::Client as IamClient;
use aws_sdk_sts::{
    Client as StsClient,
    config::Credentials as SdkCredentials,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
};
use tokio::time;
use tracing::{debug, info};

use super::{
    AssumeRoleRequest, CallerIdentity, CredentialProvider, Credentials, ProviderError,
    SessionTokenRequest,
};

/// Error code STS answers with when an MFA code does not validate
const ACCESS_DENIED: &str = "AccessDenied";

/// Credential provider backed by AWS STS and IAM
#[derive(Debug, Clone)]
pub struct AwsProvider {
    region: String,
    timeout: Duration,
}

impl AwsProvider {
    pub fn new(region: impl Into<String>, timeout: Duration) -> Self {
        Self {
            region: region.into(),
            timeout,
        }
    }

    /// SDK config signed by `caller`. Profile callers are pinned to the
    /// shared credential files so stray environment keys are never used.
    async fn sdk_config(&self, caller: &CallerIdentity) -> SdkConfig {
        let loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region.clone()));

        let loader = match caller {
            CallerIdentity::Profile(profile) => {
                debug!("Signing with profile: {}", profile);
                loader.profile_name(profile).credentials_provider(
                    ProfileFileCredentialsProvider::builder()
                        .profile_name(profile)
                        .build(),
                )
            }
            CallerIdentity::Session(creds) => {
                debug!("Signing with bastion session {}", creds.access_key_id);
                loader.credentials_provider(SdkCredentials::new(
                    &creds.access_key_id,
                    &creds.secret_access_key,
                    Some(creds.session_token.clone()),
                    None,
                    "assume-role-bastion",
                ))
            }
        };

        loader.load().await
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>> + Send,
    {
        time::timeout(self.timeout, call)
            .await
            .map_err(|_| ProviderError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })?
    }
}

#[async_trait]
impl CredentialProvider for AwsProvider {
    async fn mfa_device(
        &self,
        caller: &CallerIdentity,
        user_name: Option<&str>,
    ) -> Result<String, ProviderError> {
        info!("Calling AWS IAM ListMFADevices");

        self.bounded(async {
            let config = self.sdk_config(caller).await;
            let response = IamClient::new(&config)
                .list_mfa_devices()
                .set_user_name(user_name.map(str::to_string))
                .send()
                .await
                .map_err(|e| classify("ListMFADevices", e, false))?;

            response
                .mfa_devices()
                .first()
                .map(|device| device.serial_number().to_string())
                .ok_or(ProviderError::NoMfaDevice)
        })
        .await
    }

    async fn session_token(
        &self,
        caller: &CallerIdentity,
        request: &SessionTokenRequest,
    ) -> Result<Credentials, ProviderError> {
        info!("Calling AWS STS GetSessionToken");
        debug!("MFA serial: {}", request.mfa.serial_number);
        debug!("Duration: {} seconds", request.duration.as_secs());

        self.bounded(async {
            let config = self.sdk_config(caller).await;
            let response = StsClient::new(&config)
                .get_session_token()
                .serial_number(&request.mfa.serial_number)
                .token_code(&request.mfa.token_code)
                .duration_seconds(duration_seconds(request.duration))
                .send()
                .await
                .map_err(|e| classify("GetSessionToken", e, true))?;

            response
                .credentials()
                .map(from_sts)
                .ok_or(ProviderError::EmptyResponse)
        })
        .await
    }

    async fn assume_role(
        &self,
        caller: &CallerIdentity,
        request: &AssumeRoleRequest,
    ) -> Result<Credentials, ProviderError> {
        info!("Calling AWS STS AssumeRole");
        debug!("Role ARN: {}", request.role_arn);
        debug!("Session name: {}", request.session_name);
        debug!("Duration: {} seconds", request.duration.as_secs());

        self.bounded(async {
            let config = self.sdk_config(caller).await;
            let response = StsClient::new(&config)
                .assume_role()
                .role_arn(&request.role_arn)
                .role_session_name(&request.session_name)
                .duration_seconds(duration_seconds(request.duration))
                .set_external_id(request.external_id.clone())
                .set_serial_number(request.mfa.as_ref().map(|m| m.serial_number.clone()))
                .set_token_code(request.mfa.as_ref().map(|m| m.token_code.clone()))
                .send()
                .await
                // AccessDenied here is usually the trust policy, not the code
                .map_err(|e| classify("AssumeRole", e, false))?;

            response
                .credentials()
                .map(from_sts)
                .ok_or(ProviderError::EmptyResponse)
        })
        .await
    }
}

fn from_sts(sts_creds: &aws_sdk_sts::types::Credentials) -> Credentials {
    Credentials {
        access_key_id: sts_creds.access_key_id().to_string(),
        secret_access_key: sts_creds.secret_access_key().to_string(),
        session_token: sts_creds.session_token().to_string(),
        expiration: Some(*sts_creds.expiration()),
    }
}

/// Durations are validated against STS limits when the config is loaded
fn duration_seconds(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

fn classify<E, R>(operation: &'static str, err: SdkError<E, R>, mfa_supplied: bool) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    classify_code(operation, err.code(), message, mfa_supplied)
}

fn classify_code(
    operation: &'static str,
    code: Option<&str>,
    message: String,
    mfa_supplied: bool,
) -> ProviderError {
    match code {
        Some(ACCESS_DENIED) if mfa_supplied => ProviderError::InvalidMfaCode,
        _ => ProviderError::Service {
            operation,
            code: code.map(str::to_string),
            message,
        },
    }
}
