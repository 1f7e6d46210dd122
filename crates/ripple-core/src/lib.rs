#![deny(unsafe_code)]
#![doc = "ripple-core: 引用计数契约、有序 Handler 管道、消息编解码适配与通道组完成聚合。"]
#![doc = ""]
#![doc = "== 模块地图 =="]
#![doc = "- [`refcnt`]：显式 `retain`/`release` 契约与原子计数器；"]
#![doc = "- [`message`]：在 Pipeline 中流动的类型擦除消息；"]
#![doc = "- [`pipeline`]：节点链、上下文与 Handler 能力 trait；"]
#![doc = "- [`codec`]：解码结果与消息到消息的编解码适配器；"]
#![doc = "- [`channel`]：通道、Promise、传输协作者与嵌入式通道；"]
#![doc = "- [`group`]：通道组与组操作的聚合完成；"]
#![doc = "- [`executor`]：执行亲和性契约与参考实现。"]

pub mod channel;
pub mod codec;
pub mod error;
pub mod executor;
pub mod group;
pub mod message;
pub mod pipeline;
pub mod refcnt;
pub mod test_stubs;

pub use channel::{Channel, ChannelId, ChannelPromise, EmbeddedChannel, Transport};
pub use codec::{DecodeResult, DecoderResultProvider};
pub use error::{CoreError, ErrorCause, ErrorKind, Result, SharedError};
pub use executor::{EventExecutor, ImmediateExecutor, SingleThreadExecutor};
pub use group::{ChannelGroup, ChannelGroupError, ChannelGroupFuture};
pub use message::PipelineMessage;
pub use pipeline::{Context, Handler, InboundHandler, OutboundHandler, Pipeline};
pub use refcnt::{RefCount, ReferenceCounted};
