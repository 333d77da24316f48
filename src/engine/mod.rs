// ==========================================
// CRM 导入向导 - 引擎层
// ==========================================
// 职责: 导入管道中依赖会话状态的阶段
// - 匹配决策 / 预览分块处理 / 落库 / 后台任务
// 红线: Engine 不拼 SQL，所有存储经 Repository
// ==========================================

pub mod context;
pub mod execution_engine;
pub mod input_hash;
pub mod match_resolver;
pub mod preview_processor;
pub mod task_runner;

// 重导出核心引擎
pub use context::ImportContext;
pub use execution_engine::ExecutionEngine;
pub use input_hash::{compute_input_hash, current_input_hash};
pub use match_resolver::MatchResolver;
pub use preview_processor::{PreviewOutcome, PreviewProcessor, StopReason};
pub use task_runner::{
    FailureCallback, ImportTask, InlineTaskRunner, TaskExecutor, TaskRunner, TokioTaskRunner,
};
