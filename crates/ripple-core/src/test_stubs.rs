//! 测试桩集合：记录型 Handler 与可控的传输协作者。
//!
//! # 设计定位（Why）
//! - 管道顺序、跨线程移除与通道组聚合的测试都需要“记录发生了什么”的 Handler 与“按需失败”的传输，
//!   集中在此处避免各测试文件重复定义。
//!
//! # 使用方式（How）
//! - 多个 [`RecordingHandler`] 共享同一份 [`EventLog`]，断言时读取事件序列；
//! - [`RecordingTransport`] 记录写出的消息，`fail_writes` 打开后写入 Promise 以给定错误码失败。
//!
//! # 风险与权衡（Trade-offs）
//! - 事件以字符串记录，便于断言顺序，但不携带消息内容；需要内容时改用嵌入式通道读取。

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
};

use spin::Mutex;

use crate::{
    CoreError,
    channel::{ChannelPromise, Transport},
    error::codes,
    message::PipelineMessage,
    pipeline::{Context, Handler, HandlerDescriptor, InboundHandler, OutboundHandler, UserEvent},
};

/// 共享的事件序列。
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// 创建空事件序列。
pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// 读取事件序列的副本。
pub fn snapshot(log: &EventLog) -> Vec<String> {
    log.lock().clone()
}

/// 记录入站、出站与生命周期事件后原样转发的 Handler。
///
/// 事件格式为 `"<label>:<event>"`；生命周期钩子额外记录执行线程名称，格式为
/// `"<label>:added@<thread>"`。
pub struct RecordingHandler {
    label: String,
    log: EventLog,
}

impl RecordingHandler {
    /// 创建记录型 Handler。
    pub fn new(label: impl Into<String>, log: &EventLog) -> Self {
        Self {
            label: label.into(),
            log: Arc::clone(log),
        }
    }

    /// 转换为节点 Handler。
    pub fn into_handler(self) -> Arc<dyn Handler> {
        Arc::new(self)
    }

    fn record(&self, event: &str) {
        self.log.lock().push(format!("{}:{event}", self.label));
    }

    fn record_on_thread(&self, event: &str) {
        let current = thread::current();
        let name = current.name().unwrap_or("unnamed");
        self.log
            .lock()
            .push(format!("{}:{event}@{name}", self.label));
    }
}

impl Handler for RecordingHandler {
    fn describe(&self) -> HandlerDescriptor {
        HandlerDescriptor::new(self.label.clone(), "recording")
    }

    fn handler_added(&self, _ctx: &dyn Context) {
        self.record_on_thread("added");
    }

    fn handler_removed(&self, _ctx: &dyn Context) {
        self.record_on_thread("removed");
    }

    fn inbound(&self) -> Option<&dyn InboundHandler> {
        Some(self)
    }

    fn outbound(&self) -> Option<&dyn OutboundHandler> {
        Some(self)
    }
}

impl InboundHandler for RecordingHandler {
    fn on_channel_active(&self, ctx: &dyn Context) {
        self.record("active");
        ctx.fire_channel_active();
    }

    fn on_channel_inactive(&self, ctx: &dyn Context) {
        self.record("inactive");
        ctx.fire_channel_inactive();
    }

    fn on_read(&self, ctx: &dyn Context, msg: PipelineMessage) {
        self.record("read");
        ctx.fire_read(msg);
    }

    fn on_user_event(&self, ctx: &dyn Context, event: UserEvent) {
        self.record("user_event");
        ctx.fire_user_event(event);
    }

    fn on_exception_caught(&self, ctx: &dyn Context, error: CoreError) {
        self.record("exception");
        ctx.fire_exception_caught(error);
    }
}

impl OutboundHandler for RecordingHandler {
    fn on_close(&self, ctx: &dyn Context, promise: ChannelPromise) {
        self.record("close");
        ctx.close(promise);
    }

    fn on_write(&self, ctx: &dyn Context, msg: PipelineMessage, promise: ChannelPromise) {
        self.record("write");
        ctx.write(msg, promise);
    }

    fn on_flush(&self, ctx: &dyn Context) {
        self.record("flush");
        ctx.flush();
    }
}

/// 记录写出消息、可配置写失败的传输协作者。
#[derive(Default)]
pub struct RecordingTransport {
    written: Mutex<Vec<PipelineMessage>>,
    flushes: AtomicUsize,
    fail_writes: AtomicBool,
    closed: AtomicBool,
}

impl RecordingTransport {
    /// 创建共享实例。
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 之后的写入是否失败。
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    /// 取出已写出的消息。
    pub fn take_written(&self) -> Vec<PipelineMessage> {
        std::mem::take(&mut *self.written.lock())
    }

    /// 已写出消息数量。
    pub fn written_len(&self) -> usize {
        self.written.lock().len()
    }

    /// 刷新次数。
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Acquire)
    }

    /// 是否已关闭。
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Transport for RecordingTransport {
    fn close(&self, promise: ChannelPromise) {
        self.closed.store(true, Ordering::Release);
        promise.try_success();
    }

    fn write(&self, msg: PipelineMessage, promise: ChannelPromise) {
        if self.fail_writes.load(Ordering::Acquire) {
            let _ = msg.release();
            promise.try_failure(CoreError::new(codes::PIPELINE_CLOSED, "write rejected by transport"));
            return;
        }
        self.written.lock().push(msg);
        promise.try_success();
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::AcqRel);
    }
}
