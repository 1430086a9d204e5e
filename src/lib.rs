// multichat: multi-provider LLM fan-out core

pub mod chat;
pub mod conversation;
pub mod dispatcher;
pub mod http_server;
pub mod providers;
pub mod session;
pub mod storage;
pub mod types;

// Re-export the core surface for embedding applications
pub use chat::ChatController;
pub use conversation::ChatState;
pub use dispatcher::{Dispatcher, MISSING_PROVIDER_OR_KEY};
pub use providers::{resolve_adapter, ProviderAdapter};
pub use session::ChatSession;
pub use storage::{JsonFileStore, KvStore, MemoryStore};
pub use types::{
    HistoryMessage, ImageAttachment, Message, MessageRole, MessageStatus, NormalizedRequest,
    NormalizedResult, ProviderConfig, ProviderId, ProviderThread,
};
