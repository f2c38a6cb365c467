pub mod compact;
pub mod health;
pub mod invoke;
pub mod resolve;
