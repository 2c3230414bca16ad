//! Cross-messenger abstractions (Telegram today; Discord-style platforms fit the same port).

pub mod port;
pub mod throttled;
pub mod types;
