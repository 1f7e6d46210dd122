use crate::{CoreError, channel::ChannelId, message::PipelineMessage};

use super::handler::UserEvent;

/// 到达尾部哨兵的生命周期事件。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// 通道注册。
    Registered,
    /// 通道注销。
    Unregistered,
    /// 通道活跃。
    Active,
    /// 通道失活。
    Inactive,
    /// 读批次结束。
    ReadComplete,
    /// 可写性变化。
    WritabilityChanged(bool),
}

/// 尾部哨兵背后的汇聚点，接收没有被任何 Handler 消费的入站事件。
///
/// # 契约说明（What）
/// - 默认实现释放未消费的引用计数消息并记录 debug 日志；
/// - 未处理的异常默认以 warn 级别记录，这是异常路径的终点。
pub trait InboundSink: Send + Sync + 'static {
    /// 未被消费的消息。
    fn on_message(&self, channel: ChannelId, msg: PipelineMessage) {
        discard_message(channel, msg);
    }

    /// 未被处理的异常。
    fn on_exception(&self, channel: ChannelId, error: CoreError) {
        tracing::warn!(
            channel = %channel,
            code = error.code(),
            error = %error,
            "exception reached the tail of the pipeline; no handler processed it"
        );
    }

    /// 未被消费的用户事件。
    fn on_user_event(&self, channel: ChannelId, event: UserEvent) {
        let _ = event;
        tracing::trace!(channel = %channel, "user event discarded at tail");
    }

    /// 生命周期通知。
    fn on_lifecycle(&self, channel: ChannelId, event: LifecycleEvent) {
        let _ = (channel, event);
    }
}

/// 释放并丢弃消息，供自定义汇聚点复用。
pub fn discard_message(channel: ChannelId, msg: PipelineMessage) {
    let type_name = msg.type_name();
    tracing::debug!(
        channel = %channel,
        message = type_name,
        "discarded inbound message that reached the tail of the pipeline"
    );
    if let Err(err) = msg.release() {
        tracing::warn!(channel = %channel, error = %err, "failed to release discarded message");
    }
}

/// 默认汇聚点。
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardingSink;

impl InboundSink for DiscardingSink {}
