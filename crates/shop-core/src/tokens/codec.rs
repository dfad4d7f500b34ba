use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use uuid::Uuid;

use super::{AccessClaims, RefreshClaims, TokenError};
use crate::roles::Role;

type HmacSha256 = Hmac<Sha256>;

/// HS256 전용 검증 설정. 누락된 필수 클레임과 만료 여유 시간(leeway)을 허용하지 않습니다.
fn strict_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp", "sub"]);
    validation
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    }
}

/// 한 종류의 토큰에 대한 서명/검증 키 묶음.
#[derive(Clone)]
struct HsKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl HsKeys {
    fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            validation: strict_validation(),
        }
    }

    fn sign<T: serde::Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(TokenError::Signing)
    }

    fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        decode::<T>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(map_decode_error)
    }
}

/// Access Token 코덱.
///
/// `ACCESS_SECRET`만 필요하므로 하위 서비스와 게이트웨이가 로컬 검증에 사용합니다.
#[derive(Clone)]
pub struct AccessTokenCodec {
    keys: HsKeys,
}

impl AccessTokenCodec {
    pub fn new(secret: &SecretString) -> Self {
        Self {
            keys: HsKeys::new(secret),
        }
    }

    /// Access Token 서명.
    ///
    /// 만료 시각은 호출자(서버)가 계산해서 넘깁니다.
    pub fn sign(
        &self,
        role: Role,
        subject: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = AccessClaims {
            sub: subject.to_string(),
            role,
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
        };
        self.keys.sign(&claims)
    }

    /// Access Token 검증.
    ///
    /// 서명이 유효하고 만료된 경우에만 [`TokenError::Expired`]를 반환합니다.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.keys.verify(token)
    }
}

impl std::fmt::Debug for AccessTokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokenCodec").finish_non_exhaustive()
    }
}

/// Refresh Token 코덱.
///
/// 서명/검증과 함께 저장용 해시(`token_hash`)를 계산합니다.
/// 해시는 `REFRESH_SECRET`을 키로 하는 HMAC-SHA256의 hex 값입니다.
#[derive(Clone)]
pub struct RefreshTokenCodec {
    keys: HsKeys,
    fingerprint_mac: HmacSha256,
}

impl RefreshTokenCodec {
    pub fn new(secret: &SecretString) -> Self {
        let fingerprint_mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .expect("HMAC can take key of any size");
        Self {
            keys: HsKeys::new(secret),
            fingerprint_mac,
        }
    }

    /// Refresh Token 서명. 새 `jti`(UUIDv4)와 함께 반환합니다.
    pub fn sign(
        &self,
        subject: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(String, String), TokenError> {
        let jti = Uuid::new_v4().to_string();
        let claims = RefreshClaims {
            sub: subject.to_string(),
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
            jti: jti.clone(),
        };
        let token = self.keys.sign(&claims)?;
        Ok((token, jti))
    }

    pub fn verify(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.keys.verify(token)
    }

    /// 원본 토큰의 단방향 해시. 원본 토큰은 저장하지 않습니다.
    pub fn fingerprint(&self, raw_token: &str) -> String {
        let mut mac = self.fingerprint_mac.clone();
        mac.update(raw_token.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for RefreshTokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTokenCodec").finish_non_exhaustive()
    }
}

/// 토큰 수명.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::minutes(15),
            refresh: Duration::days(7),
        }
    }
}

/// 표현할 수 없는 토큰 수명.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LifetimeOutOfRange {
    #[error("access token lifetime out of range")]
    Access,
    #[error("refresh token lifetime out of range")]
    Refresh,
}

impl TokenLifetimes {
    /// 분/일 단위 값으로 수명을 만듭니다.
    ///
    /// 현재 시각에 더했을 때 만료 시각을 표현할 수 없으면 실패합니다.
    pub fn try_new(access_minutes: i64, refresh_days: i64) -> Result<Self, LifetimeOutOfRange> {
        let access = Duration::try_minutes(access_minutes)
            .filter(|d| representable(*d))
            .ok_or(LifetimeOutOfRange::Access)?;
        let refresh = Duration::try_days(refresh_days)
            .filter(|d| representable(*d))
            .ok_or(LifetimeOutOfRange::Refresh)?;
        Ok(Self { access, refresh })
    }
}

fn representable(lifetime: Duration) -> bool {
    Utc::now().checked_add_signed(lifetime).is_some()
}

/// 인증 서비스용 통합 코덱.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    access: AccessTokenCodec,
    refresh: RefreshTokenCodec,
    lifetimes: TokenLifetimes,
}

impl TokenCodec {
    pub fn new(
        access_secret: &SecretString,
        refresh_secret: &SecretString,
        lifetimes: TokenLifetimes,
    ) -> Self {
        Self {
            access: AccessTokenCodec::new(access_secret),
            refresh: RefreshTokenCodec::new(refresh_secret),
            lifetimes,
        }
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    pub fn access(&self) -> &AccessTokenCodec {
        &self.access
    }

    pub fn refresh(&self) -> &RefreshTokenCodec {
        &self.refresh
    }

    pub fn sign_access(
        &self,
        role: Role,
        subject: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        self.access.sign(role, subject, expires_at)
    }

    pub fn sign_refresh(
        &self,
        subject: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(String, String), TokenError> {
        self.refresh.sign(subject, expires_at)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.access.verify(token)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.refresh.verify(token)
    }

    pub fn fingerprint(&self, raw_token: &str) -> String {
        self.refresh.fingerprint(raw_token)
    }
}
