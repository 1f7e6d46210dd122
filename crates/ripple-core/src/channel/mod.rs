//! 通道标识、Promise、传输协作者与嵌入式通道。

mod embedded;
mod promise;
mod transport;

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

pub use embedded::{EmbeddedChannel, EmbeddedSink, EmbeddedTransport};
pub use promise::ChannelPromise;
pub use transport::{DiscardTransport, Transport};

use crate::{
    executor::EventExecutor,
    message::PipelineMessage,
    pipeline::{DiscardingSink, InboundSink, Pipeline},
};

/// 进程内唯一的通道标识。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

impl ChannelId {
    /// 分配下一个标识。
    pub fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// 以原始值构造，主要用于测试。
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// 原始值。
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{:08x}", self.0)
    }
}

/// 通道：标识、执行器与 Pipeline 的组合。
///
/// # 契约说明（What）
/// - 通道的全部 Pipeline 事件在其执行器上串行发生；
/// - 出站便捷方法直接委托给 Pipeline 尾部。
pub struct Channel {
    id: ChannelId,
    pipeline: Arc<Pipeline>,
    is_server: bool,
}

impl Channel {
    /// 以默认尾部汇聚点创建通道。
    pub fn new(transport: Arc<dyn Transport>, executor: Arc<dyn EventExecutor>) -> Arc<Self> {
        Self::with_sink(transport, executor, Arc::new(DiscardingSink))
    }

    /// 以自定义尾部汇聚点创建通道。
    pub fn with_sink(
        transport: Arc<dyn Transport>,
        executor: Arc<dyn EventExecutor>,
        sink: Arc<dyn InboundSink>,
    ) -> Arc<Self> {
        let id = ChannelId::next();
        Arc::new(Self {
            id,
            pipeline: Pipeline::new(id, executor, transport, sink),
            is_server: false,
        })
    }

    /// 创建监听型（服务端）通道。
    pub fn server(transport: Arc<dyn Transport>, executor: Arc<dyn EventExecutor>) -> Arc<Self> {
        let id = ChannelId::next();
        Arc::new(Self {
            id,
            pipeline: Pipeline::new(id, executor, transport, Arc::new(DiscardingSink)),
            is_server: true,
        })
    }

    /// 通道标识。
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// 是否为监听型通道。
    pub fn is_server(&self) -> bool {
        self.is_server
    }

    /// 通道 Pipeline。
    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// 通道执行器。
    pub fn executor(&self) -> &Arc<dyn EventExecutor> {
        self.pipeline.executor()
    }

    /// 通道关闭后完成。
    pub fn close_future(&self) -> ChannelPromise {
        self.pipeline.close_future()
    }

    /// 写入消息。
    pub fn write(&self, msg: PipelineMessage) -> ChannelPromise {
        self.pipeline.write(msg)
    }

    /// 写入并刷新。
    pub fn write_and_flush(&self, msg: PipelineMessage) -> ChannelPromise {
        self.pipeline.write_and_flush(msg)
    }

    /// 刷新。
    pub fn flush(&self) {
        self.pipeline.flush();
    }

    /// 断开。
    pub fn disconnect(&self) -> ChannelPromise {
        self.pipeline.disconnect()
    }

    /// 关闭。
    pub fn close(&self) -> ChannelPromise {
        self.pipeline.close()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("server", &self.is_server)
            .field("handlers", &self.pipeline.names())
            .finish()
    }
}
