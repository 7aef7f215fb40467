//! Security middleware.
//!
//! - [`CsrfMiddleware`]: issues the CSRF token cookie that deferred fragments
//!   render from on the second pass.

pub mod csrf;

pub use csrf::{CSRF_COOKIE_NAME, CsrfMiddleware, new_token};
