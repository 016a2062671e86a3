pub mod tool_loop;

pub use tool_loop::{
    AgentLoop, AgentRunParams, AgentRunResult, LoopStopReason, ToolCallRecord,
};
