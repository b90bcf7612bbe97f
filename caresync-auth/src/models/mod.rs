pub mod account;
pub mod audit_event;
pub mod credential;
pub mod qr_session;
pub mod refresh_token;

pub use account::{Account, AccountResponse, Role};
pub use audit_event::{AuditAction, AuditEvent, Severity};
pub use credential::HardwareCredential;
pub use qr_session::{ExternalClaims, QrAuthSession, QrStatus};
pub use refresh_token::RefreshTokenRecord;
