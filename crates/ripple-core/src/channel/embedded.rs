use std::{
    any::Any,
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use spin::Mutex;

use crate::{
    CoreError, Result,
    executor::ImmediateExecutor,
    message::PipelineMessage,
    pipeline::{Handler, InboundSink, LifecycleEvent, Pipeline, UserEvent},
};

use super::{Channel, ChannelId, ChannelPromise, Transport};

/// 嵌入式通道的尾部汇聚点：把到达尾部的消息与异常排队，供测试或外层 Handler 读取。
#[derive(Default)]
pub struct EmbeddedSink {
    inbound: Mutex<VecDeque<PipelineMessage>>,
    exceptions: Mutex<VecDeque<CoreError>>,
    user_events: Mutex<Vec<UserEvent>>,
    lifecycle: Mutex<Vec<LifecycleEvent>>,
}

impl EmbeddedSink {
    /// 已记录的生命周期事件。
    pub fn lifecycle_events(&self) -> Vec<LifecycleEvent> {
        self.lifecycle.lock().clone()
    }

    /// 已收到的用户事件数量。
    pub fn user_event_count(&self) -> usize {
        self.user_events.lock().len()
    }
}

impl InboundSink for EmbeddedSink {
    fn on_message(&self, _channel: ChannelId, msg: PipelineMessage) {
        self.inbound.lock().push_back(msg);
    }

    fn on_exception(&self, _channel: ChannelId, error: CoreError) {
        self.exceptions.lock().push_back(error);
    }

    fn on_user_event(&self, _channel: ChannelId, event: UserEvent) {
        self.user_events.lock().push(event);
    }

    fn on_lifecycle(&self, _channel: ChannelId, event: LifecycleEvent) {
        self.lifecycle.lock().push(event);
    }
}

/// 嵌入式通道的传输协作者：把写出的消息排队而不做真实 I/O。
#[derive(Default)]
pub struct EmbeddedTransport {
    outbound: Mutex<VecDeque<PipelineMessage>>,
    flushes: AtomicUsize,
    closed: AtomicBool,
}

impl EmbeddedTransport {
    /// 刷新次数。
    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Acquire)
    }

    /// 是否已关闭。
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Transport for EmbeddedTransport {
    fn close(&self, promise: ChannelPromise) {
        self.closed.store(true, Ordering::Release);
        promise.try_success();
    }

    fn write(&self, msg: PipelineMessage, promise: ChannelPromise) {
        if self.is_closed() {
            let _ = msg.release();
            promise.try_failure(CoreError::new(
                crate::error::codes::PIPELINE_CLOSED,
                "embedded channel is closed",
            ));
            return;
        }
        self.outbound.lock().push_back(msg);
        promise.try_success();
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::AcqRel);
    }
}

/// 在内存中运行 Pipeline 的通道。
///
/// # 教案式说明
/// - **意图（Why）**：编解码器需要在没有套接字的情况下被驱动，既用于测试，也用于在一个 Handler 内部
///   运行一条隔离的子管道（例如解压阶段）。
/// - **逻辑（How）**：执行器为 [`ImmediateExecutor`]，所有事件在调用线程上同步完成；
///   尾部消息进入 [`EmbeddedSink`] 队列，出站消息进入 [`EmbeddedTransport`] 队列。
/// - **契约（What）**：
///   - `write_inbound`/`write_outbound` 在派发完成后检查异常路径，首个未处理异常以 `Err` 返回；
///   - `finish` 关闭通道、触发失活与注销、移除全部 Handler，返回是否仍有未读消息；
///   - 留在队列中的引用计数消息由调用方读取后释放，或交给 `finish_and_release_all`。
pub struct EmbeddedChannel {
    channel: Arc<Channel>,
    sink: Arc<EmbeddedSink>,
    transport: Arc<EmbeddedTransport>,
    finished: AtomicBool,
}

impl EmbeddedChannel {
    /// 以给定 Handler 顺序创建并激活通道。
    pub fn with_handlers<'a>(
        handlers: impl IntoIterator<Item = (&'a str, Arc<dyn Handler>)>,
    ) -> Result<Self> {
        let sink = Arc::new(EmbeddedSink::default());
        let transport = Arc::new(EmbeddedTransport::default());
        let channel = Channel::with_sink(
            Arc::clone(&transport) as Arc<dyn Transport>,
            ImmediateExecutor::shared(),
            Arc::clone(&sink) as Arc<dyn InboundSink>,
        );
        for (name, handler) in handlers {
            channel.pipeline().add_last(name, handler)?;
        }
        channel.pipeline().fire_channel_registered();
        channel.pipeline().fire_channel_active();
        Ok(Self {
            channel,
            sink,
            transport,
            finished: AtomicBool::new(false),
        })
    }

    /// 通道。
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Pipeline。
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        self.channel.pipeline()
    }

    /// 尾部汇聚点。
    pub fn sink(&self) -> &EmbeddedSink {
        &self.sink
    }

    /// 传输协作者。
    pub fn transport(&self) -> &EmbeddedTransport {
        &self.transport
    }

    /// 派发入站消息并以读批次结束收尾；返回入站队列是否非空。
    pub fn write_inbound(&self, msgs: impl IntoIterator<Item = PipelineMessage>) -> Result<bool> {
        let pipeline = self.pipeline();
        for msg in msgs {
            pipeline.fire_read(msg);
        }
        pipeline.fire_read_complete();
        self.check_exception()?;
        Ok(!self.sink.inbound.lock().is_empty())
    }

    /// 读取一条入站消息。
    pub fn read_inbound(&self) -> Option<PipelineMessage> {
        self.sink.inbound.lock().pop_front()
    }

    /// 读取一条 `T` 类型的入站消息；队首类型不符时保留在队列中并返回 `None`。
    pub fn read_inbound_as<T: Any>(&self) -> Option<T> {
        take_as(&self.sink.inbound)
    }

    /// 入站队列长度。
    pub fn inbound_len(&self) -> usize {
        self.sink.inbound.lock().len()
    }

    /// 写出消息并刷新；返回出站队列是否非空。
    pub fn write_outbound(&self, msgs: impl IntoIterator<Item = PipelineMessage>) -> Result<bool> {
        let pipeline = self.pipeline();
        let promises: Vec<_> = msgs.into_iter().map(|msg| pipeline.write(msg)).collect();
        pipeline.flush();
        self.check_exception()?;
        for promise in promises {
            if let Some(cause) = promise.cause() {
                return Err(CoreError::new(cause.code(), cause.message().to_owned()).with_cause(cause));
            }
        }
        Ok(!self.transport.outbound.lock().is_empty())
    }

    /// 读取一条出站消息。
    pub fn read_outbound(&self) -> Option<PipelineMessage> {
        self.transport.outbound.lock().pop_front()
    }

    /// 读取一条 `T` 类型的出站消息。
    pub fn read_outbound_as<T: Any>(&self) -> Option<T> {
        take_as(&self.transport.outbound)
    }

    /// 出站队列长度。
    pub fn outbound_len(&self) -> usize {
        self.transport.outbound.lock().len()
    }

    /// 取出首个未处理的异常。
    pub fn check_exception(&self) -> Result<()> {
        match self.sink.exceptions.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// 关闭通道并移除全部 Handler；返回是否仍有未读消息。
    pub fn finish(&self) -> Result<bool> {
        if !self.finished.swap(true, Ordering::AcqRel) {
            let pipeline = self.pipeline();
            let _ = pipeline.close();
            pipeline.fire_channel_inactive();
            pipeline.fire_channel_unregistered();
            pipeline.destroy();
        }
        self.check_exception()?;
        Ok(self.inbound_len() > 0 || self.outbound_len() > 0)
    }

    /// 关闭通道并释放所有未读消息。
    pub fn finish_and_release_all(&self) -> Result<bool> {
        let result = self.finish();
        let released_inbound = self.release_inbound();
        let released_outbound = self.release_outbound();
        result.map(|_| released_inbound || released_outbound)
    }

    /// 释放入站队列中的全部消息，返回队列此前是否非空。
    pub fn release_inbound(&self) -> bool {
        release_all(&self.sink.inbound)
    }

    /// 释放出站队列中的全部消息，返回队列此前是否非空。
    pub fn release_outbound(&self) -> bool {
        release_all(&self.transport.outbound)
    }
}

fn take_as<T: Any>(queue: &Mutex<VecDeque<PipelineMessage>>) -> Option<T> {
    let mut queue = queue.lock();
    let msg = queue.pop_front()?;
    match msg.downcast::<T>() {
        Ok(value) => Some(value),
        Err(msg) => {
            queue.push_front(msg);
            None
        }
    }
}

fn release_all(queue: &Mutex<VecDeque<PipelineMessage>>) -> bool {
    let drained: Vec<_> = queue.lock().drain(..).collect();
    let had_messages = !drained.is_empty();
    for msg in drained {
        if let Err(err) = msg.release() {
            tracing::warn!(error = %err, "failed to release queued message");
        }
    }
    had_messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Context, InboundHandler, handler_from_inbound};

    struct Doubler;

    impl InboundHandler for Doubler {
        fn on_read(&self, ctx: &dyn Context, msg: PipelineMessage) {
            match msg.downcast::<u32>() {
                Ok(value) => ctx.fire_read(PipelineMessage::new(value * 2)),
                Err(other) => ctx.fire_read(other),
            }
        }
    }

    #[test]
    fn inbound_messages_reach_queue_in_order() {
        let channel =
            EmbeddedChannel::with_handlers([("doubler", handler_from_inbound(Doubler))])
                .expect("创建嵌入式通道");
        assert!(
            channel
                .write_inbound([1u32, 2, 3].map(PipelineMessage::new))
                .expect("写入入站")
        );
        let values: Vec<u32> = std::iter::from_fn(|| channel.read_inbound_as::<u32>()).collect();
        assert_eq!(values, [2, 4, 6]);
        assert!(!channel.finish().expect("finish"));
        assert!(channel.transport().is_closed());
        assert!(channel.pipeline().is_empty());
    }

    #[test]
    fn read_as_keeps_mismatched_message() {
        let channel = EmbeddedChannel::with_handlers([]).expect("创建嵌入式通道");
        channel
            .write_inbound([PipelineMessage::new("text")])
            .expect("写入入站");
        assert!(channel.read_inbound_as::<u32>().is_none());
        assert_eq!(channel.inbound_len(), 1);
        assert!(channel.finish_and_release_all().expect("finish"));
        assert_eq!(channel.inbound_len(), 0);
    }

    #[test]
    fn lifecycle_reaches_sink() {
        let channel = EmbeddedChannel::with_handlers([]).expect("创建嵌入式通道");
        channel.finish().expect("finish");
        assert_eq!(
            channel.sink().lifecycle_events(),
            [
                LifecycleEvent::Registered,
                LifecycleEvent::Active,
                LifecycleEvent::Inactive,
                LifecycleEvent::Unregistered,
            ]
        );
    }
}
