pub mod config;
pub mod conversation;
pub mod query;
pub mod source;
pub mod tool_call;

pub use config::{
    AnalysisConfig, CacheConfig, Config, ControllerConfig, ExecutorConfig, LlmConfig, LogFormat,
    LoggingConfig, RateLimitConfig, RateLimitsConfig, RetryConfig, RotationPolicy, RoutingConfig,
    SourcesConfig,
};
pub use conversation::{
    AttachedResult, ControllerPhase, ConversationState, FinalResponse, Message, Role, StopReason,
    ToolRequest,
};
pub use query::{Entity, EntityType, QueryAnalysis, QueryIntent, RelationshipType};
pub use source::{DatabaseSequence, SourceId, MAX_PLAN_LENGTH};
pub use tool_call::{CallStatus, FailureKind, ToolCall, ToolFailure, ToolOutcome, ToolResult};
