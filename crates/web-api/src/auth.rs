//! JWT 认证模块
//!
//! 提供访问令牌的签发与校验，以及从请求头中提取 Bearer 令牌

use application::{ApplicationError, CredentialError, CredentialService};
use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use config::JwtConfig;
use domain::UserId;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// 令牌主体，即用户 ID
    pub token_id: String,
    /// 每次签发都不同，保证重新登录后旧令牌失效
    pub jti: String,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 只校验签名，过期由 `is_expired` 单独判断
    fn claims(&self, token: &str) -> Result<Claims, CredentialError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| CredentialError::invalid(err.to_string()))
    }
}

impl CredentialService for JwtService {
    fn issue(&self, subject: UserId) -> Result<String, CredentialError> {
        let exp = Utc::now() + Duration::hours(self.config.expiration_hours);
        let claims = Claims {
            token_id: subject.to_string(),
            jti: Uuid::new_v4().to_string(),
            exp: exp.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| CredentialError::issue(err.to_string()))
    }

    fn validate(&self, token: &str) -> Result<(), CredentialError> {
        self.claims(token).map(|_| ())
    }

    fn subject_of(&self, token: &str) -> Result<String, CredentialError> {
        self.claims(token).map(|claims| claims.token_id)
    }

    fn is_expired(&self, token: &str) -> bool {
        match self.claims(token) {
            Ok(claims) => claims.exp <= Utc::now().timestamp(),
            Err(_) => true,
        }
    }
}

/// 取出 `Authorization: Bearer <token>` 中的令牌
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 校验请求头中的令牌并返回当前用户
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    let token = bearer_token(headers).ok_or(ApplicationError::Authentication)?;
    Ok(state.user_service.authenticate_token(token).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn service(expiration_hours: i64) -> JwtService {
        JwtService::new(JwtConfig {
            secret: "test-secret-key-with-at-least-32-characters".to_string(),
            expiration_hours,
        })
    }

    #[test]
    fn issued_token_carries_subject() {
        let jwt = service(1);
        let user = UserId::generate();
        let token = jwt.issue(user).unwrap();

        assert!(jwt.validate(&token).is_ok());
        assert_eq!(jwt.subject_of(&token).unwrap(), user.to_string());
        assert!(!jwt.is_expired(&token));
    }

    #[test]
    fn every_issue_produces_a_new_token() {
        let jwt = service(1);
        let user = UserId::generate();
        assert_ne!(jwt.issue(user).unwrap(), jwt.issue(user).unwrap());
    }

    #[test]
    fn expired_token_still_has_valid_signature() {
        let jwt = service(-1);
        let token = jwt.issue(UserId::generate()).unwrap();
        assert!(jwt.validate(&token).is_ok());
        assert!(jwt.is_expired(&token));
    }

    #[test]
    fn foreign_or_garbled_tokens_are_invalid() {
        let token = service(1).issue(UserId::generate()).unwrap();
        let other = JwtService::new(JwtConfig {
            secret: "another-secret-key-with-at-least-32-chars".to_string(),
            expiration_hours: 1,
        });

        assert!(other.validate(&token).is_err());
        assert!(other.is_expired(&token));
        assert!(service(1).validate("not.a.token").is_err());
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }
}
