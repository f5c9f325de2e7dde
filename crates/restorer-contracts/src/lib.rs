pub mod chat;
pub mod events;
pub mod image;
pub mod outcome;
pub mod session;
