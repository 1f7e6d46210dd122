//! 执行亲和性契约。
//!
//! # 设计背景（Why）
//! - 每个通道绑定唯一的执行器，通道内全部 Pipeline 事件在该执行器上串行发生，
//!   Handler 因而无需为通道级状态加锁；
//! - Pipeline 只依赖 [`EventExecutor`] 的两个能力：判断“当前是否已在该执行器上”，以及投递任务。
//!   调度器本身不在本 crate 范围内，这里仅提供两个参考实现用于嵌入式通道与测试。
//!
//! # 契约说明（What）
//! - `in_event_loop() == true` 时调用方可以直接内联执行；否则必须通过 `execute` 投递；
//! - `execute` 不得阻塞调用线程；同一执行器上的任务按投递顺序执行；
//! - 执行器无法接收任务时 `execute` 返回 `executor.unavailable`，任务随即被丢弃，
//!   调用方负责让任务里携带的 Promise 失败。

use std::{
    sync::Arc,
    thread::{self, JoinHandle, ThreadId},
};

use crossbeam::channel::{self, Sender};
use spin::Mutex;

use crate::error::{CoreError, Result, codes};

/// 投递到执行器的任务。
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// 单线程执行亲和性。
pub trait EventExecutor: Send + Sync + 'static {
    /// 当前线程是否就是该执行器的线程。
    fn in_event_loop(&self) -> bool;

    /// 投递任务，按投递顺序执行；执行器已关闭时返回 `executor.unavailable`。
    fn execute(&self, task: Task) -> Result<()>;

    /// 执行器名称，用于日志。
    fn name(&self) -> &str {
        "executor"
    }
}

/// 在亲和执行器上运行 `task`：已在其线程上时内联，否则投递。
pub fn run_on(executor: &Arc<dyn EventExecutor>, task: impl FnOnce() + Send + 'static) -> Result<()> {
    if executor.in_event_loop() {
        task();
        Ok(())
    } else {
        executor.execute(Box::new(task))
    }
}

/// 总是视为“在执行器上”的内联执行器。
///
/// 嵌入式通道与单元测试使用它获得同步、可预测的派发顺序。
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateExecutor;

impl ImmediateExecutor {
    /// 返回共享实例。
    pub fn shared() -> Arc<dyn EventExecutor> {
        Arc::new(Self)
    }
}

impl EventExecutor for ImmediateExecutor {
    fn in_event_loop(&self) -> bool {
        true
    }

    fn execute(&self, task: Task) -> Result<()> {
        task();
        Ok(())
    }

    fn name(&self) -> &str {
        "immediate"
    }
}

/// 由一个专属线程驱动的执行器。
///
/// # 教案式说明
/// - **意图（Why）**：验证跨线程的派发与移除语义，需要一个真实的“其他线程”执行器。
/// - **逻辑（How）**：任务经 `crossbeam` 无界通道送入工作线程，工作线程按序执行；
///   `shutdown` 关闭发送端后等待线程退出。
/// - **契约（What）**：执行器关闭后投递的任务被丢弃，`execute` 返回 `executor.unavailable`。
pub struct SingleThreadExecutor {
    name: String,
    sender: Mutex<Option<Sender<Task>>>,
    thread_id: ThreadId,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SingleThreadExecutor {
    /// 启动工作线程。
    pub fn spawn(name: impl Into<String>) -> Result<Arc<Self>> {
        let name = name.into();
        let (sender, receiver) = channel::unbounded::<Task>();
        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                for task in receiver.iter() {
                    task();
                }
            })
            .map_err(|err| {
                CoreError::new(codes::EXECUTOR_UNAVAILABLE, "failed to spawn executor thread")
                    .with_cause(err)
            })?;
        Ok(Arc::new(Self {
            name,
            thread_id: worker.thread().id(),
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }))
    }

    /// 停止接收任务并等待已投递任务执行完毕。
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let worker = self.worker.lock().take();
        if let Some(worker) = worker
            && !self.in_event_loop()
            && worker.join().is_err()
        {
            tracing::warn!(executor = %self.name, "executor thread panicked");
        }
    }
}

impl EventExecutor for SingleThreadExecutor {
    fn in_event_loop(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn execute(&self, task: Task) -> Result<()> {
        let sender = self.sender.lock().clone();
        match sender {
            Some(sender) if sender.send(task).is_ok() => Ok(()),
            _ => {
                tracing::warn!(executor = %self.name, "task rejected after shutdown");
                Err(CoreError::new(
                    codes::EXECUTOR_UNAVAILABLE,
                    format!("executor `{}` has been shut down", self.name),
                ))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for SingleThreadExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
