//! Database models split into domain-specific modules.

pub mod chat;
pub mod product;
pub mod user;

pub use chat::*;
pub use product::*;
pub use user::*;
