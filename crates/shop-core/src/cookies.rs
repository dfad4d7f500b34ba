//! 토큰 쿠키 도우미.
//!
//! 모든 토큰 쿠키는 `HttpOnly`, `Secure`, `SameSite=Lax` 속성을 가지며
//! `Expires`는 토큰 만료 시각과 같습니다. 삭제용 쿠키는 빈 값, `Max-Age=0`,
//! Unix epoch `Expires`로 만듭니다.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};
use cookie::{Cookie, SameSite};
use time::OffsetDateTime;

/// Access Token 쿠키 이름.
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
/// Refresh Token 쿠키 이름.
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";
/// 기본 쿠키 경로.
pub const DEFAULT_COOKIE_PATH: &str = "/";

fn to_offset_datetime(at: DateTime<Utc>) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(at.timestamp()).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// 토큰 쿠키 생성.
pub fn token_cookie(
    name: &'static str,
    value: impl Into<String>,
    expires_at: DateTime<Utc>,
    path: &str,
) -> Cookie<'static> {
    Cookie::build((name, value.into()))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .path(path.to_string())
        .expires(to_offset_datetime(expires_at))
        .build()
}

/// 삭제용 쿠키 생성.
pub fn cleared_cookie(name: &'static str, path: &str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .path(path.to_string())
        .max_age(time::Duration::ZERO)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}

/// 응답 헤더에 `Set-Cookie`를 추가합니다. 기존 `Set-Cookie`는 유지됩니다.
pub fn append_set_cookie(headers: &mut HeaderMap, cookie: &Cookie<'_>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            headers.append(SET_COOKIE, value);
        }
        Err(e) => {
            tracing::warn!(cookie = cookie.name(), error = %e, "Failed to encode Set-Cookie header");
        }
    }
}

/// 새 토큰 쌍의 쿠키를 설정합니다.
pub fn set_token_cookies(
    headers: &mut HeaderMap,
    access_token: &str,
    access_exp: DateTime<Utc>,
    refresh_token: &str,
    refresh_exp: DateTime<Utc>,
    path: &str,
) {
    append_set_cookie(
        headers,
        &token_cookie(ACCESS_TOKEN_COOKIE, access_token, access_exp, path),
    );
    append_set_cookie(
        headers,
        &token_cookie(REFRESH_TOKEN_COOKIE, refresh_token, refresh_exp, path),
    );
}

/// 두 토큰 쿠키를 모두 삭제합니다.
pub fn clear_token_cookies(headers: &mut HeaderMap, path: &str) {
    append_set_cookie(headers, &cleared_cookie(ACCESS_TOKEN_COOKIE, path));
    append_set_cookie(headers, &cleared_cookie(REFRESH_TOKEN_COOKIE, path));
}

/// 요청 `Cookie` 헤더에서 값을 읽습니다. 빈 값은 없는 것으로 취급합니다.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| Cookie::split_parse(raw.to_string()))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// 외부로 보내는 요청의 `Cookie` 헤더 값을 만듭니다.
pub fn request_cookie_header(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}
