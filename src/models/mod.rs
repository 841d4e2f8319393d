//! Data models for marketplace entities

mod chat;
mod notification;
mod user;
mod work;

pub use chat::*;
pub use notification::*;
pub use user::*;
pub use work::*;
