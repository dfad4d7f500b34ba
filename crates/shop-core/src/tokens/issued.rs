use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 발급된 토큰 쌍.
///
/// 인증 서비스 `/refresh` 응답 본문이자 Auth Client가 받는 형식입니다.
/// 만료 시각은 Unix timestamp(초)로 직렬화됩니다.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub access_exp: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub refresh_exp: DateTime<Utc>,
    pub is_admin: bool,
}

impl std::fmt::Debug for IssuedTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("access_exp", &self.access_exp)
            .field("refresh_exp", &self.refresh_exp)
            .field("is_admin", &self.is_admin)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_uses_unix_seconds() {
        let tokens = IssuedTokens {
            access_token: "a".into(),
            refresh_token: "r".into(),
            access_exp: DateTime::<Utc>::from_timestamp(1_700_000_900, 0).unwrap(),
            refresh_exp: DateTime::<Utc>::from_timestamp(1_700_604_800, 0).unwrap(),
            is_admin: true,
        };

        let json = serde_json::to_value(&tokens).unwrap();
        assert_eq!(json["access_exp"], 1_700_000_900);
        assert_eq!(json["refresh_exp"], 1_700_604_800);
        assert_eq!(json["is_admin"], true);

        let parsed: IssuedTokens = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, tokens);
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let tokens = IssuedTokens {
            access_token: "secret-access".into(),
            refresh_token: "secret-refresh".into(),
            access_exp: Utc::now(),
            refresh_exp: Utc::now(),
            is_admin: false,
        };
        let rendered = format!("{:?}", tokens);
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }
}
