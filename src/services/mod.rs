pub mod context_truncation;
pub mod conversation_controller;
pub mod gazetteer;
pub mod prompt_builder;
pub mod query_analyzer;
pub mod response_summarizer;
pub mod source_router;
pub mod tool_executor;

pub use context_truncation::ContextBudget;
pub use conversation_controller::ConversationController;
pub use query_analyzer::QueryAnalyzer;
pub use response_summarizer::DefaultSummarizer;
pub use source_router::SourceRouter;
pub use tool_executor::{CallGraph, ToolExecutor};
