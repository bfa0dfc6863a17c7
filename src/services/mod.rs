//! Authentication and session services

pub mod pipeline;
pub mod rbac;
pub mod risk;
pub mod session;
pub mod session_memory;
pub mod session_sqlite;
pub mod timeout;
pub mod token;

pub use pipeline::{extract_bearer, AuthPipeline, Resolution, Strategy, ValidationMode};
pub use rbac::RoleGate;
pub use risk::{RiskClassifier, RiskLevel};
pub use session::{spawn_session_cleanup, token_fingerprint, SessionStore, SessionTtl, StoreError};
pub use session_memory::MemorySessionStore;
pub use session_sqlite::SqliteSessionStore;
pub use timeout::{Guarded, StageTimeout, TimeoutGuard};
pub use token::{CredentialShape, DecodeError, DecodedCredential, TokenCodec};
