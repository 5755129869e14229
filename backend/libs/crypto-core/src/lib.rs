//! Shared credential primitives for Inkwell services
//!
//! - `jwt`: HS256 access/refresh token pairs with typed claims
//! - `password`: Argon2id password hashing and verification

pub mod jwt;
pub mod password;

pub use jwt::{Claims, TokenError, TokenIssuer, TokenKind, TokenPair};
pub use password::{hash_password, verify_password, PasswordError};
