//! Outbound notifications. Email is the only channel.

pub mod email;

pub use email::{EmailAttachment, SystemEmailService};
