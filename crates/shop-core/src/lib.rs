//! 온라인 쇼핑몰 서비스 공통 라이브러리.
//!
//! 인증 서비스와 하위 서비스(카탈로그, 장바구니, 주문)가 공유하는 구성 요소를 제공합니다:
//! - **tokens**: Access/Refresh 토큰 서명 및 검증 (HS256, 토큰 종류별 별도 비밀 키)
//! - **roles**: 사용자 역할
//! - **error**: 공통 에러 분류 및 HTTP 에러 응답
//! - **cookies**: 토큰 쿠키 생성/삭제/파싱
//! - **config**: 계층형 설정 로딩 도우미
//! - **logging**: tracing 기반 로깅 초기화

pub mod config;
pub mod cookies;
pub mod error;
pub mod logging;
pub mod roles;
pub mod tokens;

pub use error::{ApiErrorResponse, ShopError, ShopResult};
pub use roles::Role;
pub use tokens::{
    AccessClaims, AccessTokenCodec, IssuedTokens, RefreshClaims, RefreshTokenCodec, TokenCodec,
    TokenError, TokenLifetimes,
};
