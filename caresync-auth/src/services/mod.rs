pub mod audit;
pub mod auth;
pub mod authz;
pub mod cache;
pub mod email;
pub mod error;
pub mod lockout;
pub mod mfa;
pub mod qr_login;
pub mod token;
pub mod webauthn;

pub use audit::{AuditService, AuditSink, MemoryAuditSink, MongoAuditSink};
pub use auth::AuthService;
pub use authz::TenantGuard;
pub use cache::{EphemeralCache, MemoryCache, RedisCache};
pub use email::{EmailProvider, LoggingEmailService, MockEmailService};
pub use error::ServiceError;
pub use lockout::LockoutService;
pub use mfa::{MfaEnrollment, MfaService};
pub use qr_login::{
    HttpIdentityProvider, IdentityProvider, MockIdentityProvider, QrLoginService,
};
pub use token::{AccessTokenClaims, TokenPair, TokenService};
pub use webauthn::WebAuthnService;
