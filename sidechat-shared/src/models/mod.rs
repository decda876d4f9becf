pub mod assistant;
pub mod conversation;
pub mod errors;
pub mod message;
pub mod timestamp;
pub mod user;

pub use assistant::{AskAiRequest, AskAiResponse};
pub use conversation::{ConversationId, ConversationKind, Group, GroupType, Thread};
pub use errors::ApiErrorBody;
pub use message::Message;
pub use timestamp::Timestamp;
pub use user::{AuthLoginRequest, AuthResponse, User};
