//! 会话层：持久化会话模型、键值存储后端、会话持久化存储

pub mod kv;
pub mod model;
pub mod persistence;

pub use kv::{FileStore, KeyValueStore, MemoryStore, SqliteStore, StorageError};
pub use model::{ChatMessage, ResearchSession, Role};
pub use persistence::{SessionPersistence, SubtopicUpdate, DEFAULT_SESSION_EXPIRY, SESSION_KEY};
