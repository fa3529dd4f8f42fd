//! HMAC JWT signer built on `jsonwebtoken`.

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use super::claims::TokenClaims;
use super::signer::{Signer, SignerError, ValidatedClaims};
use crate::config::SigningConfig;

/// Key names of the GraphQL authorization block.
pub mod graphql_keys {
    pub const ALLOWED_ROLES: &str = "x-hasura-allowed-roles";
    pub const DEFAULT_ROLE: &str = "x-hasura-default-role";
    pub const USER_ID: &str = "x-hasura-user-id";
    pub const USER_IS_ANONYMOUS: &str = "x-hasura-user-is-anonymous";
}

/// Signs and validates HS256/HS384/HS512 tokens with a shared secret.
pub struct JwtSigner {
    issuer: String,
    algorithm: Algorithm,
    algorithm_name: &'static str,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    claims_namespace: String,
}

impl std::fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSigner")
            .field("issuer", &self.issuer)
            .field("algorithm", &self.algorithm_name)
            .field("claims_namespace", &self.claims_namespace)
            .finish_non_exhaustive()
    }
}

impl JwtSigner {
    /// Creates a signer from the signing configuration.
    ///
    /// # Errors
    ///
    /// Returns `SignerError::Key` if the algorithm is not an HMAC algorithm
    /// or the secret is empty.
    pub fn from_config(config: &SigningConfig) -> Result<Self, SignerError> {
        let (algorithm, algorithm_name) = match config.algorithm.as_str() {
            "HS256" => (Algorithm::HS256, "HS256"),
            "HS384" => (Algorithm::HS384, "HS384"),
            "HS512" => (Algorithm::HS512, "HS512"),
            other => {
                return Err(SignerError::Key {
                    message: format!("unsupported signing algorithm '{other}'"),
                });
            }
        };
        if config.secret.is_empty() {
            return Err(SignerError::Key {
                message: "signing secret is empty".to_string(),
            });
        }

        Ok(Self {
            issuer: config.issuer.clone(),
            algorithm,
            algorithm_name,
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            claims_namespace: config.claims_namespace.clone(),
        })
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss"]);
        validation.validate_aud = false; // audience is checked by the caller
        validation
    }
}

impl Signer for JwtSigner {
    fn issuer(&self) -> &str {
        &self.issuer
    }

    fn algorithm(&self) -> &str {
        self.algorithm_name
    }

    fn sign(
        &self,
        claims: &TokenClaims,
        expires_at: OffsetDateTime,
    ) -> Result<String, SignerError> {
        let mut payload: Map<String, Value> = match serde_json::to_value(claims) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(SignerError::encoding("claims must serialize to an object")),
            Err(e) => return Err(SignerError::encoding(e.to_string())),
        };
        payload.insert("iss".to_string(), Value::from(self.issuer.clone()));
        payload.insert(
            "iat".to_string(),
            Value::from(OffsetDateTime::now_utc().unix_timestamp()),
        );
        payload.insert("exp".to_string(), Value::from(expires_at.unix_timestamp()));

        let header = Header::new(self.algorithm);
        jsonwebtoken::encode(&header, &payload, &self.encoding_key)
            .map_err(|e| SignerError::encoding(e.to_string()))
    }

    fn validate(&self, token: &str) -> Result<ValidatedClaims, SignerError> {
        let data =
            jsonwebtoken::decode::<ValidatedClaims>(token, &self.decoding_key, &self.validation())?;
        Ok(data.claims)
    }

    fn graphql_claims(
        &self,
        user_id: Uuid,
        is_anonymous: bool,
        allowed_roles: &[String],
        default_role: &str,
    ) -> Result<(String, Value), SignerError> {
        let mut block = Map::new();
        block.insert(
            graphql_keys::ALLOWED_ROLES.to_string(),
            Value::from(allowed_roles.to_vec()),
        );
        block.insert(
            graphql_keys::DEFAULT_ROLE.to_string(),
            Value::from(default_role),
        );
        block.insert(
            graphql_keys::USER_ID.to_string(),
            Value::from(user_id.to_string()),
        );
        block.insert(
            graphql_keys::USER_IS_ANONYMOUS.to_string(),
            Value::from(is_anonymous.to_string()),
        );
        Ok((self.claims_namespace.clone(), Value::Object(block)))
    }

    fn jwks(&self) -> JwkSet {
        // symmetric keys are never published
        JwkSet { keys: Vec::new() }
    }
}
