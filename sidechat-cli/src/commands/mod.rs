pub mod ask;
pub mod completion;
pub mod config;
pub mod messages;
pub mod read;
pub mod session;
pub mod unread;
