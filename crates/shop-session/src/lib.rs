//! 하위 서비스용 세션 미들웨어.
//!
//! - [`middleware`]: 쿠키 기반 자동 갱신 미들웨어 (`require_auth`, `require_admin`)
//! - [`edge`]: 게이트웨이 앞단의 무상태 토큰 검증
//! - [`client`]: 인증 서비스 `/refresh` 호출 클라이언트
//! - [`identity`]: 핸들러에서 쓰는 `AuthUser` 추출기
//!
//! ```rust,ignore
//! let session = SessionConfig::load()?;
//! let app = Router::new()
//!     .route("/cart", get(cart))
//!     .layer(axum::middleware::from_fn_with_state(
//!         session.auto_refresh_state()?,
//!         require_auth,
//!     ));
//! ```

pub mod client;
pub mod config;
pub mod edge;
pub mod identity;
pub mod middleware;

pub use client::{AuthClient, ClientError, TokenRefresher};
pub use config::SessionConfig;
pub use edge::{edge_auth, EdgePolicy};
pub use identity::AuthUser;
pub use middleware::{require_admin, require_auth, AutoRefreshState};
