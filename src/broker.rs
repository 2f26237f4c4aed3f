//! Bastion session management and role assumption.

use tracing::{debug, info, warn};

use crate::{
    aws::{
        AssumeRoleRequest, CallerIdentity, CredentialProvider, Credentials, MfaCode,
        ProviderError, RoleTarget, SessionTokenRequest,
    },
    config::{AuthScheme, Config},
    error::{AssumeRoleError, Result},
    prompt::Prompt,
    resolver::ResolvedInputs,
    session::{BastionSession, RoleSession, SessionContext, SessionState},
};

pub struct Broker<'a> {
    pub config: &'a Config,
    pub provider: &'a dyn CredentialProvider,
    pub prompt: &'a dyn Prompt,
}

impl Broker<'_> {
    /// Assume the resolved role and record the role session in `ctx`.
    /// `ctx.role` is only set when every call succeeded.
    pub async fn assume(
        &self,
        ctx: &mut SessionContext,
        inputs: &ResolvedInputs,
        now: i64,
    ) -> Result<()> {
        let target = RoleTarget::new(&inputs.account_id, &inputs.role);
        let role_arn = target.role_arn();

        let (caller, request) = match self.config.auth_scheme {
            AuthScheme::Bastion => {
                let session = self
                    .ensure_bastion_session(ctx, &inputs.profile, inputs.mfa_token.clone(), now)
                    .await?;
                let request = AssumeRoleRequest {
                    role_arn: role_arn.clone(),
                    session_name: now.to_string(),
                    external_id: Some(target.account_id.clone()),
                    duration: self.config.role_session_timeout,
                    mfa: None,
                };
                (CallerIdentity::Session(session), request)
            }
            AuthScheme::Root => {
                warn!("Assuming role without a bastion session; every switch needs a new MFA code");
                let mfa = self
                    .mfa_code(&inputs.profile, inputs.mfa_token.clone())
                    .await?;
                let request = AssumeRoleRequest {
                    role_arn: role_arn.clone(),
                    session_name: now.to_string(),
                    external_id: None,
                    duration: self.config.role_session_timeout,
                    mfa: Some(mfa),
                };
                (CallerIdentity::Profile(inputs.profile.clone()), request)
            }
        };

        info!("Assuming role {}", role_arn);
        let credentials = self
            .provider
            .assume_role(&caller, &request)
            .await
            .map_err(|source| AssumeRoleError::RoleAssumptionFailed {
                role_arn: role_arn.clone(),
                source,
            })?;

        ctx.role = Some(RoleSession {
            credentials,
            account_id: inputs.account_id.clone(),
            account_name: inputs.account_name.clone(),
            role: inputs.role.clone(),
            region: inputs.region.clone(),
            profile: inputs.profile.clone(),
            started_at: now,
        });

        Ok(())
    }

    /// Reuse the bastion session while it is inside its window, otherwise
    /// start a new one with an MFA code.
    pub async fn ensure_bastion_session(
        &self,
        ctx: &mut SessionContext,
        profile: &str,
        mfa_token: Option<String>,
        now: i64,
    ) -> Result<Credentials> {
        let state = BastionSession::state(ctx.bastion.as_ref(), now, self.config.session_timeout);

        if let (SessionState::Active, Some(session)) = (state, &ctx.bastion) {
            info!(
                "Reusing bastion session started {}s ago",
                now.saturating_sub(session.started_at)
            );
            return Ok(session.credentials.clone());
        }

        info!("Bastion session state {:?}; requesting a new session", state);
        let request = SessionTokenRequest {
            mfa: self.mfa_code(profile, mfa_token).await?,
            duration: self.config.session_timeout,
        };

        let credentials = self
            .provider
            .session_token(&CallerIdentity::Profile(profile.to_string()), &request)
            .await
            .map_err(|e| match e {
                ProviderError::InvalidMfaCode => AssumeRoleError::InvalidMfaCode,
                other => AssumeRoleError::SessionRequestFailed(other),
            })?;

        ctx.bastion = Some(BastionSession {
            credentials: credentials.clone(),
            started_at: now,
        });

        Ok(credentials)
    }

    /// Token first, so a missing token fails before any AWS call
    async fn mfa_code(&self, profile: &str, token: Option<String>) -> Result<MfaCode> {
        let token_code = match token {
            Some(token) => token,
            None => self
                .prompt
                .ask("MFA token", None)?
                .ok_or(AssumeRoleError::MissingMfaToken)?,
        };

        let preset = self
            .config
            .mfa_serial
            .clone()
            .or_else(|| self.config.settings.mfa_serial(profile).map(str::to_string));

        let serial_number = match preset {
            Some(serial) => serial,
            None => self
                .provider
                .mfa_device(
                    &CallerIdentity::Profile(profile.to_string()),
                    self.config.mfa_username.as_deref(),
                )
                .await
                .map_err(|source| AssumeRoleError::MfaDeviceLookupFailed {
                    profile: profile.to_string(),
                    source,
                })?,
        };
        debug!("Using MFA device {}", serial_number);

        Ok(MfaCode {
            serial_number,
            token_code,
        })
    }
}
