//! 有序 Handler 管道与节点上下文。
//!
//! - [`Pipeline`]：绑定到单个通道的节点链，入站事件自头向尾、出站事件自尾向头派发；
//! - [`Context`]：Handler 回调时获得的节点视图，负责把事件转发给相邻节点；
//! - [`InboundHandler`] / [`OutboundHandler`]：按方向划分的回调合约，默认实现均为透传；
//! - [`InboundSink`]：尾部汇聚点，接收无人消费的入站事件。

mod context;
mod event;
mod handler;
mod node;
#[allow(clippy::module_inception)]
mod pipeline;
mod sink;

pub use context::Context;
pub use handler::{
    Handler, HandlerDescriptor, InboundHandler, OutboundHandler, UserEvent, handler_from_duplex,
    handler_from_inbound, handler_from_outbound,
};
pub use node::{HandlerRegistration, NodeState};
pub use pipeline::{NodeContext, Pipeline};
pub use sink::{DiscardingSink, InboundSink, LifecycleEvent, discard_message};
