//! 可跨执行器投递的事件载体。
//!
//! 节点执行器与调用线程不同时，事件需要被移动进任务闭包；这里把每类回调的参数收拢为拥有所有权的
//! 枚举值，投递与内联两条路径共用同一套分发代码。

use std::net::SocketAddr;

use crate::{
    CoreError,
    channel::{ChannelId, ChannelPromise, Transport},
    message::PipelineMessage,
};

use super::{
    context::Context,
    handler::{InboundHandler, OutboundHandler, UserEvent},
    sink::{InboundSink, LifecycleEvent},
};

pub(crate) enum InboundEvent {
    Registered,
    Unregistered,
    Active,
    Inactive,
    Read(PipelineMessage),
    ReadComplete,
    UserEvent(UserEvent),
    WritabilityChanged(bool),
    ExceptionCaught(CoreError),
}

impl InboundEvent {
    pub(crate) fn deliver(self, handler: &dyn InboundHandler, ctx: &dyn Context) {
        match self {
            Self::Registered => handler.on_channel_registered(ctx),
            Self::Unregistered => handler.on_channel_unregistered(ctx),
            Self::Active => handler.on_channel_active(ctx),
            Self::Inactive => handler.on_channel_inactive(ctx),
            Self::Read(msg) => handler.on_read(ctx, msg),
            Self::ReadComplete => handler.on_read_complete(ctx),
            Self::UserEvent(event) => handler.on_user_event(ctx, event),
            Self::WritabilityChanged(writable) => handler.on_writability_changed(ctx, writable),
            Self::ExceptionCaught(error) => handler.on_exception_caught(ctx, error),
        }
    }

    pub(crate) fn into_sink(self, sink: &dyn InboundSink, channel: ChannelId) {
        match self {
            Self::Registered => sink.on_lifecycle(channel, LifecycleEvent::Registered),
            Self::Unregistered => sink.on_lifecycle(channel, LifecycleEvent::Unregistered),
            Self::Active => sink.on_lifecycle(channel, LifecycleEvent::Active),
            Self::Inactive => sink.on_lifecycle(channel, LifecycleEvent::Inactive),
            Self::Read(msg) => sink.on_message(channel, msg),
            Self::ReadComplete => sink.on_lifecycle(channel, LifecycleEvent::ReadComplete),
            Self::UserEvent(event) => sink.on_user_event(channel, event),
            Self::WritabilityChanged(writable) => {
                sink.on_lifecycle(channel, LifecycleEvent::WritabilityChanged(writable))
            }
            Self::ExceptionCaught(error) => sink.on_exception(channel, error),
        }
    }
}

pub(crate) enum OutboundEvent {
    Bind(SocketAddr, ChannelPromise),
    Connect(SocketAddr, Option<SocketAddr>, ChannelPromise),
    Disconnect(ChannelPromise),
    Close(ChannelPromise),
    Deregister(ChannelPromise),
    Read,
    Write(PipelineMessage, ChannelPromise),
    Flush,
}

impl OutboundEvent {
    pub(crate) fn deliver(self, handler: &dyn OutboundHandler, ctx: &dyn Context) {
        match self {
            Self::Bind(local, promise) => handler.on_bind(ctx, local, promise),
            Self::Connect(remote, local, promise) => handler.on_connect(ctx, remote, local, promise),
            Self::Disconnect(promise) => handler.on_disconnect(ctx, promise),
            Self::Close(promise) => handler.on_close(ctx, promise),
            Self::Deregister(promise) => handler.on_deregister(ctx, promise),
            Self::Read => handler.on_read_request(ctx),
            Self::Write(msg, promise) => handler.on_write(ctx, msg, promise),
            Self::Flush => handler.on_flush(ctx),
        }
    }

    /// 事件携带的 Promise。
    pub(crate) fn promise(&self) -> Option<&ChannelPromise> {
        match self {
            Self::Bind(_, promise)
            | Self::Connect(_, _, promise)
            | Self::Disconnect(promise)
            | Self::Close(promise)
            | Self::Deregister(promise)
            | Self::Write(_, promise) => Some(promise),
            Self::Read | Self::Flush => None,
        }
    }

    pub(crate) fn into_transport(self, transport: &dyn Transport) {
        match self {
            Self::Bind(local, promise) => transport.bind(local, promise),
            Self::Connect(remote, local, promise) => transport.connect(remote, local, promise),
            Self::Disconnect(promise) => transport.disconnect(promise),
            Self::Close(promise) => transport.close(promise),
            Self::Deregister(promise) => transport.deregister(promise),
            Self::Read => transport.begin_read(),
            Self::Write(msg, promise) => transport.write(msg, promise),
            Self::Flush => transport.flush(),
        }
    }
}
