//! zkvault-auth — authentication over the zkvault stores.
//!
//! Three concerns live here:
//!
//! - [`tokens`]: stateless signed access tokens plus persisted single-use
//!   refresh tokens;
//! - [`resolve`]: "how do I log in with this email" resolution that answers
//!   identically for known and unknown accounts;
//! - [`login`]: registration, the two login paths (plain password and
//!   zero-knowledge master-password hash), key initialization, credential
//!   changes and logout.

pub mod error;
pub mod login;
pub mod rate;
pub mod resolve;
pub mod tokens;

pub use error::{AuthError, AuthResult};
pub use login::{
    AccountService, DeviceInfo, KeyInit, LoginOutcome, RequestMeta, HINT_ATTEMPT_LIMIT,
    LOGIN_ATTEMPT_LIMIT, REGISTER_ATTEMPT_LIMIT,
};
pub use rate::{MemoryRateCounter, RateCounter};
pub use resolve::{resolve, AccountLookup, LoginMethod};
pub use tokens::{Claims, TokenConfig, TokenPair, TokenService};
