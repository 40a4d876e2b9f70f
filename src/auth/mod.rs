//! Authentication module
//! Tokens are issued by the account service; this service only verifies them.

pub mod jwt;
pub mod middleware;

pub use jwt::{Claims, JwtService};
pub use middleware::{extract_token, jwt_auth_middleware, AuthContext};
