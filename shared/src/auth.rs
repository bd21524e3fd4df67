use crate::error::{json_response, ApiError};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct OAuthRequest {
    pub code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i32,
    /// Canonical account id for the signed-in email. Set on OAuth
    /// sign-in, where the token `sub` can be a federated identity that
    /// differs from the account the email already resolves to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Claims we read out of a Cognito id token
#[derive(Debug, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

type HmacSha256 = Hmac<Sha256>;

/// Compute the SECRET_HASH for Cognito authentication
fn compute_secret_hash(username: &str, client_id: &str, client_secret: &str) -> String {
    let message = format!("{}{}", username, client_id);
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    let result = mac.finalize();
    general_purpose::STANDARD.encode(result.into_bytes())
}

fn body_str(body: &Body) -> &str {
    match body {
        Body::Text(text) => text,
        Body::Binary(bytes) => std::str::from_utf8(bytes).unwrap_or(""),
        Body::Empty => "",
    }
}

fn invalid_body(e: serde_json::Error) -> Result<Response<Body>, Error> {
    tracing::error!("Failed to parse request body: {}", e);
    json_response(
        StatusCode::BAD_REQUEST,
        &serde_json::json!({ "error": format!("Invalid request body: {}", e) }),
    )
}

fn token_response(
    result: Option<&aws_sdk_cognitoidentityprovider::types::AuthenticationResultType>,
    fallback_refresh: Option<&str>,
) -> Option<TokenResponse> {
    result.map(|auth| TokenResponse {
        id_token: auth.id_token().unwrap_or_default().to_string(),
        access_token: auth.access_token().unwrap_or_default().to_string(),
        refresh_token: auth
            .refresh_token()
            .or(fallback_refresh)
            .unwrap_or_default()
            .to_string(),
        expires_in: auth.expires_in(),
        user_id: None,
    })
}

/// Handle user login with Cognito
pub async fn login(
    cognito_client: &CognitoClient,
    client_id: &str,
    client_secret: &str,
    body: &Body,
) -> Result<Response<Body>, Error> {
    let login_request: LoginRequest = match serde_json::from_str(body_str(body)) {
        Ok(req) => req,
        Err(e) => return invalid_body(e),
    };

    tracing::info!("Authenticating user: {}", login_request.email);

    let secret_hash = compute_secret_hash(&login_request.email, client_id, client_secret);

    let auth_result = cognito_client
        .initiate_auth()
        .auth_flow(aws_sdk_cognitoidentityprovider::types::AuthFlowType::UserPasswordAuth)
        .client_id(client_id)
        .auth_parameters("USERNAME", &login_request.email)
        .auth_parameters("PASSWORD", &login_request.password)
        .auth_parameters("SECRET_HASH", &secret_hash)
        .send()
        .await;

    match auth_result {
        Ok(response) => {
            if let Some(tokens) = token_response(response.authentication_result(), None) {
                tracing::info!("Authentication successful for user: {}", login_request.email);
                json_response(StatusCode::OK, &serde_json::to_value(&tokens)?)
            } else {
                tracing::error!("No authentication result returned");
                json_response(
                    StatusCode::UNAUTHORIZED,
                    &serde_json::json!({ "error": "No authentication result returned" }),
                )
            }
        }
        Err(e) => {
            let error_message = format!("{:?}", e);
            tracing::error!("Cognito authentication error: {}", error_message);

            // Extract user-friendly error message
            let user_message = if error_message.contains("NotAuthorizedException") {
                "Incorrect email or password"
            } else if error_message.contains("UserNotConfirmedException") {
                "Please verify your email before logging in"
            } else if error_message.contains("UserNotFoundException") {
                "No account found with this email"
            } else if error_message.contains("PasswordResetRequiredException") {
                "Password reset required"
            } else if error_message.contains("TooManyRequestsException") {
                "Too many login attempts. Please try again later"
            } else {
                "Login failed. Please check your credentials"
            };

            json_response(
                StatusCode::UNAUTHORIZED,
                &serde_json::json!({ "error": user_message }),
            )
        }
    }
}

fn validate_signup(req: &SignupRequest) -> BTreeMap<&'static str, String> {
    let mut errors = BTreeMap::new();
    if req.name.trim().is_empty() {
        errors.insert("name", "Name is required".to_string());
    }
    if req.email.trim().is_empty() || !req.email.contains('@') {
        errors.insert("email", "A valid email is required".to_string());
    }
    if req.password.len() < 8 {
        errors.insert(
            "password",
            "Password must be at least 8 characters".to_string(),
        );
    }
    errors
}

/// Handle user registration: Cognito signup plus the profile row
pub async fn signup(
    cognito_client: &CognitoClient,
    dynamo_client: &DynamoClient,
    table_name: &str,
    client_id: &str,
    client_secret: &str,
    body: &Body,
) -> Result<Response<Body>, Error> {
    let signup_request: SignupRequest = match serde_json::from_str(body_str(body)) {
        Ok(req) => req,
        Err(e) => return invalid_body(e),
    };

    let errors = validate_signup(&signup_request);
    if !errors.is_empty() {
        return ApiError::Validation(errors).into_response();
    }

    tracing::info!("Signing up user: {}", signup_request.email);

    let secret_hash = compute_secret_hash(&signup_request.email, client_id, client_secret);

    let signup_result = cognito_client
        .sign_up()
        .client_id(client_id)
        .username(&signup_request.email)
        .password(&signup_request.password)
        .secret_hash(&secret_hash)
        .user_attributes(
            aws_sdk_cognitoidentityprovider::types::AttributeType::builder()
                .name("email")
                .value(&signup_request.email)
                .build()?,
        )
        .user_attributes(
            aws_sdk_cognitoidentityprovider::types::AttributeType::builder()
                .name("name")
                .value(&signup_request.name)
                .build()?,
        )
        .send()
        .await;

    match signup_result {
        Ok(response) => {
            tracing::info!("Signup successful for user: {}", signup_request.email);
            let user_id = response.user_sub().to_string();

            // Registered accounts are usable immediately; fall back to the
            // email-verification flow when the pool id is not configured
            if let Ok(user_pool_id) = std::env::var("COGNITO_USER_POOL_ID") {
                if let Err(e) = cognito_client
                    .admin_confirm_sign_up()
                    .user_pool_id(&user_pool_id)
                    .username(&signup_request.email)
                    .send()
                    .await
                {
                    tracing::error!("Failed to auto-confirm user: {:?}", e);
                }
            } else {
                tracing::warn!("COGNITO_USER_POOL_ID not set; skipping auto-confirm");
            }

            if let Err(e) = crate::users::put_user(
                dynamo_client,
                table_name,
                &user_id,
                &signup_request.email,
                Some(&signup_request.name),
                None,
            )
            .await
            {
                tracing::error!("Failed to create profile row: {}", e);
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &serde_json::json!({ "error": e }),
                );
            }

            json_response(
                StatusCode::OK,
                &serde_json::json!({ "message": "Signup successful" }),
            )
        }
        Err(e) => {
            let error_message = format!("{:?}", e);
            tracing::error!("Cognito signup error: {}", error_message);

            let user_message = if error_message.contains("InvalidPasswordException") {
                "Password must contain at least 8 characters with uppercase, lowercase, number, and special character"
            } else if error_message.contains("UsernameExistsException") {
                "An account with this email already exists"
            } else if error_message.contains("InvalidParameterException") {
                "Invalid email or password format"
            } else {
                "Signup failed. Please check your credentials and try again."
            };

            json_response(
                StatusCode::BAD_REQUEST,
                &serde_json::json!({ "error": user_message }),
            )
        }
    }
}

/// Exchange a refresh token for fresh credentials
pub async fn refresh_token(
    cognito_client: &CognitoClient,
    client_id: &str,
    client_secret: &str,
    body: &Body,
) -> Result<Response<Body>, Error> {
    let refresh_request: RefreshRequest = match serde_json::from_str(body_str(body)) {
        Ok(req) => req,
        Err(e) => return invalid_body(e),
    };

    let secret_hash = compute_secret_hash(&refresh_request.email, client_id, client_secret);

    let auth_result = cognito_client
        .initiate_auth()
        .auth_flow(aws_sdk_cognitoidentityprovider::types::AuthFlowType::RefreshTokenAuth)
        .client_id(client_id)
        .auth_parameters("REFRESH_TOKEN", &refresh_request.refresh_token)
        .auth_parameters("SECRET_HASH", &secret_hash)
        .send()
        .await;

    match auth_result {
        Ok(response) => {
            // Cognito omits the refresh token on refresh; reuse the submitted one
            if let Some(tokens) = token_response(
                response.authentication_result(),
                Some(&refresh_request.refresh_token),
            ) {
                json_response(StatusCode::OK, &serde_json::to_value(&tokens)?)
            } else {
                json_response(
                    StatusCode::UNAUTHORIZED,
                    &serde_json::json!({ "error": "No authentication result returned" }),
                )
            }
        }
        Err(e) => {
            tracing::error!("Cognito refresh error: {:?}", e);
            json_response(
                StatusCode::UNAUTHORIZED,
                &serde_json::json!({ "error": "Session expired. Please sign in again" }),
            )
        }
    }
}

#[derive(Deserialize)]
struct HostedUiTokens {
    id_token: String,
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i32,
}

/// Decode the claims segment of a JWT without verifying the signature.
/// The token comes straight from the Cognito token endpoint over TLS,
/// so verification happens at the API Gateway authorizer, not here.
pub fn decode_id_token_claims(id_token: &str) -> Result<IdTokenClaims, String> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| "Malformed id token".to_string())?;
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| format!("Failed to decode id token payload: {}", e))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("Failed to parse id token claims: {}", e))
}

/// Handle the Google OAuth callback: exchange the hosted-UI
/// authorization code for tokens and make sure a profile row exists.
/// The same email always resolves to the same account, whichever
/// sign-in method created it.
pub async fn oauth_exchange(
    http_client: &reqwest::Client,
    dynamo_client: &DynamoClient,
    table_name: &str,
    cognito_domain: &str,
    client_id: &str,
    client_secret: &str,
    redirect_uri: &str,
    body: &Body,
) -> Result<Response<Body>, Error> {
    let oauth_request: OAuthRequest = match serde_json::from_str(body_str(body)) {
        Ok(req) => req,
        Err(e) => return invalid_body(e),
    };

    let basic = general_purpose::STANDARD.encode(format!("{}:{}", client_id, client_secret));
    let token_result = http_client
        .post(format!("https://{}/oauth2/token", cognito_domain))
        .header("Authorization", format!("Basic {}", basic))
        .form(&[
            ("grant_type", "authorization_code"),
            ("client_id", client_id),
            ("code", &oauth_request.code),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .await;

    let response = match token_result {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Token endpoint request failed: {}", e);
            return ApiError::Internal(format!("token endpoint unreachable: {}", e))
                .into_response();
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        tracing::error!("Token exchange rejected ({}): {}", status, detail);
        return json_response(
            StatusCode::UNAUTHORIZED,
            &serde_json::json!({ "error": "OAuth sign-in failed" }),
        );
    }

    let tokens: HostedUiTokens = match response.json().await {
        Ok(tokens) => tokens,
        Err(e) => {
            return ApiError::Internal(format!("bad token endpoint response: {}", e))
                .into_response()
        }
    };

    let claims = match decode_id_token_claims(&tokens.id_token) {
        Ok(claims) => claims,
        Err(e) => return ApiError::Internal(e).into_response(),
    };

    let Some(email) = claims.email.as_deref() else {
        return json_response(
            StatusCode::UNAUTHORIZED,
            &serde_json::json!({ "error": "OAuth provider returned no email" }),
        );
    };

    let canonical_id = crate::users::ensure_user(
        dynamo_client,
        table_name,
        &claims.sub,
        email,
        claims.name.as_deref(),
        claims.picture.as_deref(),
    )
    .await?;

    if canonical_id != claims.sub {
        tracing::info!(
            "OAuth sub {} resolved to existing account {}",
            claims.sub,
            canonical_id
        );
    }

    let tokens = oauth_token_response(tokens, canonical_id);
    json_response(StatusCode::OK, &serde_json::to_value(&tokens)?)
}

/// The hosted-UI tokens plus the account id the email resolves to,
/// which is what clients must use for ownership, not the token `sub`.
fn oauth_token_response(tokens: HostedUiTokens, canonical_user_id: String) -> TokenResponse {
    TokenResponse {
        id_token: tokens.id_token,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token.unwrap_or_default(),
        expires_in: tokens.expires_in,
        user_id: Some(canonical_user_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_hash_is_deterministic() {
        let a = compute_secret_hash("user@example.com", "client", "secret");
        let b = compute_secret_hash("user@example.com", "client", "secret");
        assert_eq!(a, b);
        assert_ne!(a, compute_secret_hash("other@example.com", "client", "secret"));
    }

    #[test]
    fn test_decode_id_token_claims() {
        let claims = serde_json::json!({
            "sub": "abc-123",
            "email": "user@example.com",
            "name": "User",
        });
        let payload =
            general_purpose::URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let token = format!("eyJhbGciOiJSUzI1NiJ9.{}.signature", payload);

        let decoded = decode_id_token_claims(&token).unwrap();
        assert_eq!(decoded.sub, "abc-123");
        assert_eq!(decoded.email.as_deref(), Some("user@example.com"));
        assert_eq!(decoded.picture, None);
    }

    #[test]
    fn test_decode_rejects_malformed_token() {
        assert!(decode_id_token_claims("not-a-jwt").is_err());
        assert!(decode_id_token_claims("a.!!!.c").is_err());
    }

    #[test]
    fn test_oauth_response_carries_the_canonical_account_id() {
        // an email first registered with a password resolves to that
        // account even when the federated token carries a new sub
        let tokens = HostedUiTokens {
            id_token: "id".to_string(),
            access_token: "access".to_string(),
            refresh_token: None,
            expires_in: 3600,
        };
        let response = oauth_token_response(tokens, "password-account-id".to_string());
        assert_eq!(response.user_id.as_deref(), Some("password-account-id"));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["userId"], "password-account-id");
    }

    #[test]
    fn test_password_token_response_omits_user_id() {
        let response = TokenResponse {
            id_token: "id".to_string(),
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_in: 3600,
            user_id: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("userId").is_none());
    }

    #[test]
    fn test_signup_validation() {
        let errors = validate_signup(&SignupRequest {
            name: " ".to_string(),
            email: "nope".to_string(),
            password: "short".to_string(),
        });
        assert!(errors.contains_key("name"));
        assert!(errors.contains_key("email"));
        assert!(errors.contains_key("password"));

        let ok = validate_signup(&SignupRequest {
            name: "Reader".to_string(),
            email: "reader@example.com".to_string(),
            password: "longenough".to_string(),
        });
        assert!(ok.is_empty());
    }
}
