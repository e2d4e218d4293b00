pub mod audit;
pub mod headers;
pub mod password;
pub mod rate_limit;

pub use headers::security_headers;
pub use password::{hash_password, password_strength, validate_password, verify_password};
pub use rate_limit::{RateLimit, RateLimitKind, RateLimiter};
