//! HTTP handlers for the authentication service.

pub mod accounts;
pub mod auth;
pub mod mfa;
pub mod qr;
pub mod webauthn;

pub use accounts::*;
pub use auth::*;
pub use mfa::*;
pub use qr::*;
pub use webauthn::*;
