mod auth;
mod mfa;
mod qr;
mod webauthn;

pub use auth::*;
pub use mfa::*;
pub use qr::*;
pub use webauthn::*;
