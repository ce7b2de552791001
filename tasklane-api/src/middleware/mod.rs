/// HTTP middleware
///
/// - `auth`: bearer-token authentication
/// - `pagination`: list query parameters and response envelope
/// - `security`: security response headers

pub mod auth;
pub mod pagination;
pub mod security;
