// ==========================================
// CRM 导入向导 - 后台任务
// ==========================================
// 职责: 定义可序列化的导入任务与任务执行接口
// 约定:
// - 每个任务只执行一次（不重试：部分输出已写出，重试会重复）
// - 失败通过回调上报
// - 同一会话的任务由调用方保证顺序执行
// ==========================================

use crate::engine::execution_engine::ExecutionEngine;
use crate::engine::preview_processor::{PreviewOutcome, PreviewProcessor};
use crate::importer::error::{ImportError, ImportResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info};

// ==========================================
// ImportTask - 导入任务
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum ImportTask {
    /// 计算预览
    ProcessPreview {
        import_id: String,
        team_id: String,
        input_hash: String,
    },
    /// 落库
    ExecuteImport { import_id: String, team_id: String },
}

impl ImportTask {
    pub fn name(&self) -> &'static str {
        match self {
            ImportTask::ProcessPreview { .. } => "process_preview",
            ImportTask::ExecuteImport { .. } => "execute_import",
        }
    }

    pub fn import_id(&self) -> &str {
        match self {
            ImportTask::ProcessPreview { import_id, .. } => import_id,
            ImportTask::ExecuteImport { import_id, .. } => import_id,
        }
    }
}

/// 失败回调
pub type FailureCallback = Arc<dyn Fn(&ImportTask, &ImportError) + Send + Sync>;

// ==========================================
// TaskRunner Trait
// ==========================================
// 用途: 向导接口提交后台任务
// 实现者: TokioTaskRunner（阻塞线程池）, InlineTaskRunner（同步执行）
pub trait TaskRunner: Send + Sync {
    /// 提交任务
    ///
    /// # 返回
    /// - Ok(()): 已提交（Inline 实现下已执行成功）
    /// - Err: 提交失败（Inline 实现下为任务执行错误）
    fn dispatch(&self, task: ImportTask) -> ImportResult<()>;
}

// ==========================================
// TaskExecutor - 任务分发到管道阶段
// ==========================================
#[derive(Clone)]
pub struct TaskExecutor {
    preview: Arc<PreviewProcessor>,
    execution: Arc<ExecutionEngine>,
}

impl TaskExecutor {
    pub fn new(preview: Arc<PreviewProcessor>, execution: Arc<ExecutionEngine>) -> Self {
        Self { preview, execution }
    }

    pub fn run(&self, task: &ImportTask) -> ImportResult<()> {
        info!(task = task.name(), import_id = task.import_id(), "开始执行导入任务");
        match task {
            ImportTask::ProcessPreview {
                import_id,
                team_id,
                input_hash,
            } => {
                let outcome = self.preview.run(import_id, team_id, input_hash)?;
                if let PreviewOutcome::Stopped(reason) = outcome {
                    info!(import_id = %import_id, reason = ?reason, "预览任务提前结束");
                }
            }
            ImportTask::ExecuteImport { import_id, team_id } => {
                self.execution.run(import_id, team_id)?;
            }
        }
        Ok(())
    }
}

fn report_failure(on_failure: Option<&FailureCallback>, task: &ImportTask, err: &ImportError) {
    error!(task = task.name(), import_id = task.import_id(), error = %err, "导入任务失败");
    if let Some(callback) = on_failure {
        callback(task, err);
    }
}

// ==========================================
// InlineTaskRunner - 在当前线程同步执行
// ==========================================
pub struct InlineTaskRunner {
    executor: TaskExecutor,
    on_failure: Option<FailureCallback>,
}

impl InlineTaskRunner {
    pub fn new(executor: TaskExecutor) -> Self {
        Self {
            executor,
            on_failure: None,
        }
    }

    pub fn with_failure_callback(mut self, callback: FailureCallback) -> Self {
        self.on_failure = Some(callback);
        self
    }
}

impl TaskRunner for InlineTaskRunner {
    fn dispatch(&self, task: ImportTask) -> ImportResult<()> {
        self.executor.run(&task).inspect_err(|err| {
            report_failure(self.on_failure.as_ref(), &task, err);
        })
    }
}

// ==========================================
// TokioTaskRunner - tokio 阻塞线程池执行
// ==========================================
pub struct TokioTaskRunner {
    executor: TaskExecutor,
    handle: Handle,
    on_failure: Option<FailureCallback>,
}

impl TokioTaskRunner {
    /// # 参数
    /// - handle: tokio 运行时句柄（任务在其阻塞线程池上执行）
    pub fn new(executor: TaskExecutor, handle: Handle) -> Self {
        Self {
            executor,
            handle,
            on_failure: None,
        }
    }

    pub fn with_failure_callback(mut self, callback: FailureCallback) -> Self {
        self.on_failure = Some(callback);
        self
    }

    /// 提交任务并返回句柄（可等待任务结束）
    pub fn spawn(&self, task: ImportTask) -> JoinHandle<ImportResult<()>> {
        let executor = self.executor.clone();
        let on_failure = self.on_failure.clone();
        self.handle.spawn_blocking(move || {
            executor.run(&task).inspect_err(|err| {
                report_failure(on_failure.as_ref(), &task, err);
            })
        })
    }
}

impl TaskRunner for TokioTaskRunner {
    fn dispatch(&self, task: ImportTask) -> ImportResult<()> {
        drop(self.spawn(task));
        Ok(())
    }
}
