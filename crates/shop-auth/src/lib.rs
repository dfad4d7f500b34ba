//! 인증 서비스.
//!
//! 사용자 자격 증명과 세션 수명 주기를 관리합니다:
//! - 회원가입 (Argon2id 해싱)
//! - 로그인 (Access/Refresh Token 발급, 쿠키 설정)
//! - Refresh Token 로테이션 (단일 사용, 행 잠금 트랜잭션)
//! - 로그아웃 (해시 기반 폐기)

pub mod config;
pub mod metrics;
pub mod middleware;
pub mod password;
pub mod repository;
pub mod routes;
pub mod service;
pub mod state;

pub use config::AuthConfig;
pub use repository::{CredentialStore, MemoryCredentialStore, PgCredentialStore};
pub use service::{AuthError, AuthService};
pub use state::AppState;
