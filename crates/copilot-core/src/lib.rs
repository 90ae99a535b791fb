//! copilot-core: Core types for the copilot chat assistant
//!
//! Conversation state, fenced-code segmentation, the progressive reveal
//! scheduler and the relay contract shared by the relay and CLI crates.

pub mod error;
pub mod export;
pub mod message;
pub mod preview;
pub mod project;
pub mod relay;
pub mod reveal;
pub mod segment;
pub mod session;
pub mod store;
pub mod turn;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::Error;
pub use export::ChatExport;
pub use message::{IdClock, Message, RelayMessage, Role};
pub use preview::{Preview, PREVIEW_LANGUAGES};
pub use project::Project;
pub use relay::{Relay, RelayErrorBody, RelayReply, RelayRequest};
pub use reveal::{Reveal, RevealHandle, RevealPhase, RevealStep, Revealer};
pub use segment::{code_blocks, code_id, reconstruct, segment, CodeSpan, Span};
pub use session::{Session, DEFAULT_SYSTEM_PROMPT};
pub use store::{JsonFileStore, MemoryStore, Store};
pub use turn::{NoopObserver, TurnObserver, TurnOutcome, TurnRunner};

pub type Result<T> = std::result::Result<T, Error>;
