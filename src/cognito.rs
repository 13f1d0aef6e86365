//! Cognito user-pool and identity-pool calls over the AWS JSON 1.1 protocol.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::error::{AuthError, FetchError};
use crate::fetch::CredentialExchange;
use crate::session::IdentityProvider;
use crate::srp::{PasswordVerifier, SrpClient};
use crate::types::{Credentials, Session, TemporaryCredentials};

const USER_POOL_TARGET: &str = "AWSCognitoIdentityProviderService.InitiateAuth";
const CHALLENGE_TARGET: &str = "AWSCognitoIdentityProviderService.RespondToAuthChallenge";
const IDENTITY_TARGET: &str = "AWSCognitoIdentityService.GetCredentialsForIdentity";
const PASSWORD_VERIFIER: &str = "PASSWORD_VERIFIER";

pub struct CognitoClient {
    http: Client,
    pool_id: String,
    client_id: String,
    identity_id: String,
    login_provider: String,
    user_pool_endpoint: String,
    identity_endpoint: String,
}

#[derive(Debug)]
enum CallError {
    Service { code: String, message: String },
    Transport(String),
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallError::Service { code, message } => write!(f, "{code}: {message}"),
            CallError::Transport(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Deserialize)]
struct ServiceFault {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    authentication_result: Option<AuthenticationResult>,
    challenge_name: Option<String>,
    #[serde(default)]
    challenge_parameters: HashMap<String, String>,
    session: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    id_token: String,
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CredentialsResponse {
    credentials: TemporaryCredentials,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthRequest<'a> {
    auth_flow: &'a str,
    client_id: &'a str,
    auth_parameters: HashMap<&'a str, &'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RespondToAuthChallengeRequest<'a> {
    challenge_name: &'a str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a str>,
    challenge_responses: HashMap<&'a str, &'a str>,
}

impl CognitoClient {
    pub fn new(upstream: &UpstreamConfig) -> Self {
        Self::with_endpoints(
            upstream,
            upstream.user_pool_endpoint(),
            upstream.identity_endpoint(),
        )
    }

    pub fn with_endpoints(upstream: &UpstreamConfig, user_pool_endpoint: String, identity_endpoint: String) -> Self {
        CognitoClient {
            http: Client::new(),
            pool_id: upstream.pool_id.clone(),
            client_id: upstream.client_id.clone(),
            identity_id: upstream.identity_id.clone(),
            login_provider: upstream.login_provider(),
            user_pool_endpoint,
            identity_endpoint,
        }
    }

    async fn call<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        target: &str,
        body: &B,
    ) -> Result<R, CallError> {
        let response = self
            .http
            .post(endpoint)
            .header("content-type", "application/x-amz-json-1.1")
            .header("x-amz-target", target)
            .json(body)
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_slice(&bytes).map_err(|e| CallError::Transport(format!("malformed {target} response: {e}")));
        }

        match serde_json::from_slice::<ServiceFault>(&bytes) {
            Ok(fault) if status.is_client_error() && !fault.kind.is_empty() => {
                // Fault types may be namespaced, e.g. "com.amazonaws...#NotAuthorizedException".
                let code = fault.kind.rsplit('#').next().unwrap_or_default().to_string();
                Err(CallError::Service { code, message: fault.message })
            }
            _ => Err(CallError::Transport(format!("{target} returned {status}"))),
        }
    }

    async fn initiate_auth(&self, flow: &str, parameters: HashMap<&str, &str>) -> Result<InitiateAuthResponse, AuthError> {
        let request = InitiateAuthRequest {
            auth_flow: flow,
            client_id: &self.client_id,
            auth_parameters: parameters,
        };
        self.call(&self.user_pool_endpoint, USER_POOL_TARGET, &request)
            .await
            .map_err(auth_error)
    }

    /// Answers the PASSWORD_VERIFIER challenge issued for `srp`.
    async fn verify_password(
        &self,
        srp: &SrpClient,
        challenge: InitiateAuthResponse,
        password: &str,
    ) -> Result<InitiateAuthResponse, AuthError> {
        let parameters = &challenge.challenge_parameters;
        let param = |name: &str| {
            parameters
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| AuthError::ProviderUnreachable(format!("{PASSWORD_VERIFIER} challenge without {name}")))
        };
        let verifier = PasswordVerifier {
            user_id: param("USER_ID_FOR_SRP")?,
            salt: param("SALT")?,
            srp_b: param("SRP_B")?,
            secret_block: param("SECRET_BLOCK")?,
        };
        let claim = srp
            .password_claim(&verifier, password, Utc::now())
            .map_err(|e| AuthError::ProviderUnreachable(e.to_string()))?;

        debug!(user_id = %claim.username, "RespondToAuthChallenge {PASSWORD_VERIFIER}");
        let request = RespondToAuthChallengeRequest {
            challenge_name: PASSWORD_VERIFIER,
            client_id: &self.client_id,
            session: challenge.session.as_deref(),
            challenge_responses: HashMap::from([
                ("USERNAME", claim.username.as_str()),
                ("TIMESTAMP", claim.timestamp.as_str()),
                ("PASSWORD_CLAIM_SECRET_BLOCK", claim.secret_block.as_str()),
                ("PASSWORD_CLAIM_SIGNATURE", claim.signature.as_str()),
            ]),
        };
        self.call(&self.user_pool_endpoint, CHALLENGE_TARGET, &request)
            .await
            .map_err(auth_error)
    }
}

fn authentication_result(response: InitiateAuthResponse) -> Result<AuthenticationResult, AuthError> {
    match (response.authentication_result, response.challenge_name) {
        (Some(result), _) => Ok(result),
        (None, Some(challenge)) => Err(AuthError::InvalidCredentials(format!("unsupported challenge {challenge}"))),
        (None, None) => Err(AuthError::ProviderUnreachable("no authentication result".to_string())),
    }
}

fn auth_error(e: CallError) -> AuthError {
    match e {
        CallError::Service { ref code, .. }
            if matches!(
                code.as_str(),
                "NotAuthorizedException"
                    | "InvalidParameterException"
                    | "UserNotFoundException"
                    | "UserNotConfirmedException"
                    | "PasswordResetRequiredException"
            ) =>
        {
            AuthError::InvalidCredentials(e.to_string())
        }
        other => AuthError::ProviderUnreachable(other.to_string()),
    }
}

fn into_session(result: AuthenticationResult, previous_refresh: Option<&str>) -> Result<Session, AuthError> {
    let refresh_token = result
        .refresh_token
        .or_else(|| previous_refresh.map(str::to_string))
        .ok_or_else(|| AuthError::ProviderUnreachable("no refresh token issued".to_string()))?;
    Ok(Session {
        id_token: result.id_token,
        access_token: result.access_token,
        refresh_token,
        expires_at: result.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
    })
}

#[async_trait]
impl IdentityProvider for CognitoClient {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        debug!(username = %credentials.username, "InitiateAuth USER_SRP_AUTH");
        let srp = SrpClient::new(&self.pool_id);
        let srp_a = srp.public_hex();
        let parameters = HashMap::from([
            ("USERNAME", credentials.username.as_str()),
            ("SRP_A", srp_a.as_str()),
        ]);
        let mut response = self.initiate_auth("USER_SRP_AUTH", parameters).await?;
        if response.challenge_name.as_deref() == Some(PASSWORD_VERIFIER) {
            response = self.verify_password(&srp, response, &credentials.password).await?;
        }
        into_session(authentication_result(response)?, None)
    }

    async fn refresh(&self, session: &Session) -> Result<Session, AuthError> {
        debug!("InitiateAuth REFRESH_TOKEN_AUTH");
        let parameters = HashMap::from([("REFRESH_TOKEN", session.refresh_token.as_str())]);
        let response = self.initiate_auth("REFRESH_TOKEN_AUTH", parameters).await?;
        into_session(authentication_result(response)?, Some(&session.refresh_token))
    }
}

#[async_trait]
impl CredentialExchange for CognitoClient {
    async fn credentials_for_identity(&self, id_token: &str) -> Result<TemporaryCredentials, FetchError> {
        let mut logins = serde_json::Map::new();
        logins.insert(self.login_provider.clone(), id_token.into());
        let body = json!({ "IdentityId": self.identity_id, "Logins": logins });
        let response: CredentialsResponse = self
            .call(&self.identity_endpoint, IDENTITY_TARGET, &body)
            .await
            .map_err(|e| match e {
                CallError::Service { ref code, .. } if code == "NotAuthorizedException" => {
                    FetchError::NotAuthorized(e.to_string())
                }
                other => FetchError::Transport(other.to_string()),
            })?;
        Ok(response.credentials)
    }
}
