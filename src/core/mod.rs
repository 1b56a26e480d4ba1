pub mod collaborators;
pub mod finalizer;
pub mod realtime;
pub mod session;
pub mod upstream;

// Re-export commonly used types for convenience
pub use collaborators::{
    CollaboratorError, CollaboratorResult, ConversationClient, ConversationReply,
    HttpSummaryClient, SummaryDispatcher,
};
pub use finalizer::SessionFinalizer;
pub use realtime::{
    OpenAIRealtimeConfig, OpenAIRealtimeConnector, RealtimeConnection, RealtimeConnector,
    RealtimeError, RealtimeResult,
};
pub use session::{
    CallSession, CallState, PushOutcome, RegistryError, Role, SessionError, SessionRegistry, Turn,
};
pub use upstream::UpstreamClient;
