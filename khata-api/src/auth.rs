//! Authentication for the Khata API
//!
//! Supports two credential types:
//! - API keys (`X-API-Key` header) with the tenant supplied via
//!   `X-Tenant-Id`
//! - JWT bearer tokens (`Authorization: Bearer ...`) carrying user, tenant,
//!   and roles in the claims
//!
//! Successful authentication produces an [`AuthContext`] which the
//! middleware injects into request extensions.

use std::collections::HashSet;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use khata_core::{TenantId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{DEFAULT_JWT_EXPIRATION_SECS, MIN_JWT_SECRET_LENGTH};
use crate::error::{ApiError, ApiResult};

/// Development fallback secret. Refused in production by
/// [`AuthConfig::validate_for_production`].
const DEV_JWT_SECRET: &str = "khata_dev_secret_do_not_use_in_prod";

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret for signing and validating JWTs.
    pub jwt_secret: String,
    /// Accepted API keys.
    pub api_keys: HashSet<String>,
    /// Token lifetime in seconds.
    pub token_expiration_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            api_keys: HashSet::new(),
            token_expiration_secs: DEFAULT_JWT_EXPIRATION_SECS,
        }
    }
}

impl AuthConfig {
    /// Load from environment variables:
    /// - `KHATA_JWT_SECRET`: signing secret (required in production)
    /// - `KHATA_API_KEYS`: comma-separated accepted keys
    /// - `KHATA_JWT_EXPIRATION_SECS`: token lifetime (default: 3600)
    pub fn from_env() -> Self {
        let jwt_secret =
            std::env::var("KHATA_JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.to_string());

        let api_keys = std::env::var("KHATA_API_KEYS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let token_expiration_secs = std::env::var("KHATA_JWT_EXPIRATION_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_JWT_EXPIRATION_SECS);

        Self {
            jwt_secret,
            api_keys,
            token_expiration_secs,
        }
    }

    pub fn add_api_key(&mut self, key: String) {
        self.api_keys.insert(key);
    }

    /// Reject configurations that must not reach production.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        if self.jwt_secret == DEV_JWT_SECRET {
            return Err(ApiError::invalid_input(
                "KHATA_JWT_SECRET is the development default. Set a real secret in production.",
            ));
        }
        if self.jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ApiError::invalid_input(format!(
                "KHATA_JWT_SECRET must be at least {} characters",
                MIN_JWT_SECRET_LENGTH
            )));
        }
        Ok(())
    }
}

// ============================================================================
// CONTEXT & CLAIMS
// ============================================================================

/// How the request authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    ApiKey,
    Jwt,
}

/// Authenticated request context, injected into request extensions by the
/// auth middleware.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub roles: Vec<String>,
    pub auth_method: AuthMethod,
}

impl AuthContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Tenant id
    pub tenant: Uuid,
    /// Role names
    pub roles: Vec<String>,
    /// Expiration (unix seconds)
    pub exp: i64,
    /// Issued at (unix seconds)
    pub iat: i64,
}

// ============================================================================
// TOKEN OPERATIONS
// ============================================================================

/// Generate a signed JWT for a user.
pub fn generate_jwt_token(
    config: &AuthConfig,
    user_id: UserId,
    tenant_id: TenantId,
    roles: Vec<String>,
) -> ApiResult<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        tenant: tenant_id,
        roles,
        exp: now + config.token_expiration_secs,
        iat: now,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::internal_error(format!("Failed to sign token: {}", e)))
}

/// Validate a JWT and build the auth context from its claims.
pub fn validate_jwt_token(config: &AuthConfig, token: &str) -> ApiResult<AuthContext> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => ApiError::token_expired(),
        _ => ApiError::invalid_token("Invalid authentication token"),
    })?;

    let user_id = data
        .claims
        .sub
        .parse::<Uuid>()
        .map_err(|_| ApiError::invalid_token("Token subject is not a valid user id"))?;

    Ok(AuthContext {
        user_id,
        tenant_id: data.claims.tenant,
        roles: data.claims.roles,
        auth_method: AuthMethod::Jwt,
    })
}

/// Validate an API key and build the auth context for it.
///
/// API-key callers carry no user identity of their own; a stable synthetic
/// user id is derived from the key so audit records stay attributable.
pub fn validate_api_key(
    config: &AuthConfig,
    api_key: &str,
    tenant_id_header: Option<&str>,
) -> ApiResult<AuthContext> {
    if !config.api_keys.contains(api_key) {
        return Err(ApiError::unauthorized("Invalid API key"));
    }

    let tenant_id = tenant_id_header
        .ok_or_else(|| ApiError::missing_field("X-Tenant-Id"))?
        .parse::<Uuid>()
        .map_err(|_| ApiError::invalid_input("X-Tenant-Id must be a UUID"))?;

    let user_id = Uuid::new_v5(&Uuid::NAMESPACE_OID, api_key.as_bytes());

    Ok(AuthContext {
        user_id,
        tenant_id,
        roles: vec!["api".to_string()],
        auth_method: AuthMethod::ApiKey,
    })
}

/// Authenticate a request from its credential headers.
///
/// API keys are checked first, then bearer tokens. A request carrying
/// neither is rejected.
pub fn authenticate(
    config: &AuthConfig,
    api_key_header: Option<&str>,
    auth_header: Option<&str>,
    tenant_id_header: Option<&str>,
) -> ApiResult<AuthContext> {
    if let Some(api_key) = api_key_header {
        return validate_api_key(config, api_key, tenant_id_header);
    }

    if let Some(auth_value) = auth_header {
        let token = auth_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::invalid_token("Authorization header must use Bearer scheme"))?;
        return validate_jwt_token(config, token);
    }

    Err(ApiError::unauthorized(
        "Authentication required: provide X-API-Key or Authorization header",
    ))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use khata_core::new_entity_id;

    fn test_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.jwt_secret = "unit_test_secret_that_is_long_enough!".to_string();
        config.add_api_key("test_key_123".to_string());
        config
    }

    #[test]
    fn test_jwt_round_trip() {
        let config = test_config();
        let user_id = new_entity_id();
        let tenant_id = new_entity_id();

        let token =
            generate_jwt_token(&config, user_id, tenant_id, vec!["admin".to_string()]).unwrap();
        let context = validate_jwt_token(&config, &token).unwrap();

        assert_eq!(context.user_id, user_id);
        assert_eq!(context.tenant_id, tenant_id);
        assert!(context.has_role("admin"));
        assert_eq!(context.auth_method, AuthMethod::Jwt);
    }

    #[test]
    fn test_jwt_wrong_secret_rejected() {
        let config = test_config();
        let token = generate_jwt_token(&config, new_entity_id(), new_entity_id(), vec![]).unwrap();

        let mut other = test_config();
        other.jwt_secret = "a_completely_different_secret_value!!".to_string();
        let result = validate_jwt_token(&other, &token);
        assert!(matches!(
            result,
            Err(ApiError {
                code: crate::error::ErrorCode::InvalidToken,
                ..
            })
        ));
    }

    #[test]
    fn test_api_key_requires_tenant_header() {
        let config = test_config();
        let result = validate_api_key(&config, "test_key_123", None);
        assert!(matches!(
            result,
            Err(ApiError {
                code: crate::error::ErrorCode::MissingField,
                ..
            })
        ));
    }

    #[test]
    fn test_api_key_auth_succeeds() {
        let config = test_config();
        let tenant = new_entity_id();
        let context =
            validate_api_key(&config, "test_key_123", Some(&tenant.to_string())).unwrap();

        assert_eq!(context.tenant_id, tenant);
        assert_eq!(context.auth_method, AuthMethod::ApiKey);
        assert!(context.has_role("api"));
        // Synthetic user id is stable for a given key.
        let again = validate_api_key(&config, "test_key_123", Some(&tenant.to_string())).unwrap();
        assert_eq!(context.user_id, again.user_id);
    }

    #[test]
    fn test_unknown_api_key_rejected() {
        let config = test_config();
        let tenant = new_entity_id().to_string();
        assert!(validate_api_key(&config, "nope", Some(&tenant)).is_err());
    }

    #[test]
    fn test_authenticate_requires_some_credential() {
        let config = test_config();
        assert!(authenticate(&config, None, None, None).is_err());
    }

    #[test]
    fn test_authenticate_rejects_non_bearer_scheme() {
        let config = test_config();
        let result = authenticate(&config, None, Some("Basic dXNlcjpwYXNz"), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_production_validation_rejects_dev_secret() {
        let config = AuthConfig::default();
        assert!(config.validate_for_production().is_err());

        let mut hardened = AuthConfig::default();
        hardened.jwt_secret = "x".repeat(48);
        assert!(hardened.validate_for_production().is_ok());

        let mut short = AuthConfig::default();
        short.jwt_secret = "short".to_string();
        assert!(short.validate_for_production().is_err());
    }
}
