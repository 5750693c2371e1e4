pub mod conversation;
pub mod timeline;

pub use conversation::{Conversation, MergeOutcome, Message};
pub use timeline::ConversationStore;
