use std::{any::Any, borrow::Cow, net::SocketAddr, sync::Arc};

use crate::{CoreError, channel::ChannelPromise, message::PipelineMessage};

use super::context::Context;

/// 用户自定义事件，沿入站方向传播。
pub type UserEvent = Arc<dyn Any + Send + Sync>;

/// Handler 自描述信息，供注册表与日志使用。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerDescriptor {
    name: Cow<'static, str>,
    category: Cow<'static, str>,
}

impl HandlerDescriptor {
    /// 构造描述。
    pub fn new(name: impl Into<Cow<'static, str>>, category: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
        }
    }

    /// 匿名描述，仅给出类别。
    pub fn anonymous(category: impl Into<Cow<'static, str>>) -> Self {
        Self::new("anonymous", category)
    }

    /// 名称。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 类别（如 `codec`、`inbound-handler`）。
    pub fn category(&self) -> &str {
        &self.category
    }
}

/// Pipeline 节点承载的 Handler。
///
/// # 教案式说明
/// - **意图（Why）**：一个节点可以只处理入站、只处理出站或两者兼有；Pipeline 需要在不做向下转型的
///   前提下知道节点具备哪些能力，同时为节点提供挂载/卸载生命周期钩子。
/// - **逻辑（How）**：`inbound()`/`outbound()` 返回能力视图，`None` 表示该方向直接跳过此节点；
///   `handler_added`/`handler_removed` 在节点的执行器上调用。
/// - **契约（What）**：能力视图在 Handler 生命周期内必须稳定，Pipeline 会在插入时缓存判断结果。
pub trait Handler: Send + Sync + 'static {
    /// 返回 Handler 元数据，默认提供匿名描述。
    fn describe(&self) -> HandlerDescriptor {
        HandlerDescriptor::anonymous("handler")
    }

    /// 节点链入且即将开始接收事件前调用。
    fn handler_added(&self, ctx: &dyn Context) {
        let _ = ctx;
    }

    /// 节点移出后调用，用于释放 Handler 持有的资源。
    fn handler_removed(&self, ctx: &dyn Context) {
        let _ = ctx;
    }

    /// 入站能力视图。
    fn inbound(&self) -> Option<&dyn InboundHandler> {
        None
    }

    /// 出站能力视图。
    fn outbound(&self) -> Option<&dyn OutboundHandler> {
        None
    }
}

/// 入站事件处理合约，事件自传输侧流向应用侧。
///
/// # 契约说明（What）
/// - 每个方法的默认实现都是“原样转发给下一个入站节点”，未覆盖的事件即为透传；
/// - 消费事件需要显式不调用 `ctx.fire_*`；被消费的引用计数消息由实现方负责释放；
/// - 方法在节点执行器上调用，不得阻塞。
pub trait InboundHandler: Send + Sync + 'static {
    /// 通道注册到执行器。
    fn on_channel_registered(&self, ctx: &dyn Context) {
        ctx.fire_channel_registered();
    }

    /// 通道从执行器注销。
    fn on_channel_unregistered(&self, ctx: &dyn Context) {
        ctx.fire_channel_unregistered();
    }

    /// 通道活跃时调用。
    fn on_channel_active(&self, ctx: &dyn Context) {
        ctx.fire_channel_active();
    }

    /// 通道不再活跃。
    fn on_channel_inactive(&self, ctx: &dyn Context) {
        ctx.fire_channel_inactive();
    }

    /// 处理读到的消息。
    fn on_read(&self, ctx: &dyn Context, msg: PipelineMessage) {
        ctx.fire_read(msg);
    }

    /// 一批读取完成。
    fn on_read_complete(&self, ctx: &dyn Context) {
        ctx.fire_read_complete();
    }

    /// 用户事件。
    fn on_user_event(&self, ctx: &dyn Context, event: UserEvent) {
        ctx.fire_user_event(event);
    }

    /// 可写性变化。
    fn on_writability_changed(&self, ctx: &dyn Context, is_writable: bool) {
        ctx.fire_writability_changed(is_writable);
    }

    /// 异常处理。
    fn on_exception_caught(&self, ctx: &dyn Context, error: CoreError) {
        ctx.fire_exception_caught(error);
    }
}

/// 出站事件处理合约，事件自应用侧流向传输侧。
///
/// # 契约说明（What）
/// - 默认实现转发给前一个出站节点；最终到达头部哨兵并交给 [`Transport`](crate::channel::Transport)；
/// - 截获写入的实现必须完成或转交传入的 Promise，否则调用方将永远等待。
pub trait OutboundHandler: Send + Sync + 'static {
    /// 绑定本地地址。
    fn on_bind(&self, ctx: &dyn Context, local: SocketAddr, promise: ChannelPromise) {
        ctx.bind(local, promise);
    }

    /// 连接远端。
    fn on_connect(
        &self,
        ctx: &dyn Context,
        remote: SocketAddr,
        local: Option<SocketAddr>,
        promise: ChannelPromise,
    ) {
        ctx.connect(remote, local, promise);
    }

    /// 断开连接。
    fn on_disconnect(&self, ctx: &dyn Context, promise: ChannelPromise) {
        ctx.disconnect(promise);
    }

    /// 关闭通道。
    fn on_close(&self, ctx: &dyn Context, promise: ChannelPromise) {
        ctx.close(promise);
    }

    /// 注销。
    fn on_deregister(&self, ctx: &dyn Context, promise: ChannelPromise) {
        ctx.deregister(promise);
    }

    /// 请求读取。
    fn on_read_request(&self, ctx: &dyn Context) {
        ctx.read();
    }

    /// 写入消息。
    fn on_write(&self, ctx: &dyn Context, msg: PipelineMessage, promise: ChannelPromise) {
        ctx.write(msg, promise);
    }

    /// 刷新写缓冲。
    fn on_flush(&self, ctx: &dyn Context) {
        ctx.flush();
    }
}

/// 将入站 Handler 适配为节点 Handler。
pub fn handler_from_inbound<H: InboundHandler>(handler: H) -> Arc<dyn Handler> {
    Arc::new(InboundHandlerSlot(handler))
}

/// 将出站 Handler 适配为节点 Handler。
pub fn handler_from_outbound<H: OutboundHandler>(handler: H) -> Arc<dyn Handler> {
    Arc::new(OutboundHandlerSlot(handler))
}

/// 将同时实现入站与出站的 Handler 适配为节点 Handler。
pub fn handler_from_duplex<H: InboundHandler + OutboundHandler>(handler: H) -> Arc<dyn Handler> {
    Arc::new(DuplexHandlerSlot(handler))
}

struct InboundHandlerSlot<H>(H);

impl<H: InboundHandler> Handler for InboundHandlerSlot<H> {
    fn describe(&self) -> HandlerDescriptor {
        HandlerDescriptor::new(std::any::type_name::<H>(), "inbound-handler")
    }

    fn inbound(&self) -> Option<&dyn InboundHandler> {
        Some(&self.0)
    }
}

struct OutboundHandlerSlot<H>(H);

impl<H: OutboundHandler> Handler for OutboundHandlerSlot<H> {
    fn describe(&self) -> HandlerDescriptor {
        HandlerDescriptor::new(std::any::type_name::<H>(), "outbound-handler")
    }

    fn outbound(&self) -> Option<&dyn OutboundHandler> {
        Some(&self.0)
    }
}

struct DuplexHandlerSlot<H>(H);

impl<H: InboundHandler + OutboundHandler> Handler for DuplexHandlerSlot<H> {
    fn describe(&self) -> HandlerDescriptor {
        HandlerDescriptor::new(std::any::type_name::<H>(), "duplex-handler")
    }

    fn inbound(&self) -> Option<&dyn InboundHandler> {
        Some(&self.0)
    }

    fn outbound(&self) -> Option<&dyn OutboundHandler> {
        Some(&self.0)
    }
}
