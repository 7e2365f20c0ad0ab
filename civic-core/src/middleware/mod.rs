pub mod rate_limit;
pub mod security_headers;
pub mod tracing;

pub use rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter};
pub use security_headers::security_headers_middleware;
pub use tracing::{request_id_middleware, RequestId, REQUEST_ID_HEADER};
