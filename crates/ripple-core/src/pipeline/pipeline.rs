use std::{net::SocketAddr, sync::Arc};

use spin::Mutex;

use crate::{
    CoreError, Result,
    channel::{ChannelId, ChannelPromise, Transport},
    error::codes,
    executor::{EventExecutor, run_on},
    message::PipelineMessage,
};

use super::{
    context::Context,
    event::{InboundEvent, OutboundEvent},
    handler::{Handler, UserEvent},
    node::{HandlerNode, HandlerRegistration, NodeChain, NodeState, Snapshot, position_of},
    sink::InboundSink,
};

#[derive(Clone, Copy)]
enum Position<'a> {
    First,
    Last,
    Before(&'a str),
    After(&'a str),
}

#[derive(Clone, Copy, Debug)]
enum MutationKind {
    Add,
    Remove,
    Replace,
}

impl MutationKind {
    fn as_label(self) -> &'static str {
        match self {
            MutationKind::Add => "add",
            MutationKind::Remove => "remove",
            MutationKind::Replace => "replace",
        }
    }
}

/// 绑定到单个通道的有序 Handler 链。
///
/// # 教案式说明
/// - **意图（Why）**：入站事件自传输侧（头部）流向应用侧（尾部），出站事件反向流动；
///   链路需要在事件进行中被安全地增删改，且不能破坏正在进行的遍历。
/// - **逻辑（How）**：
///   1. 节点序列以 `ArcSwap` 快照发布，变更在互斥锁内复制向量并原子替换；
///      节点自身的 [`NodeState`] 决定它是否接收事件；
///   2. 派发时通过节点身份在最新快照中定位“下一个”，节点已被移出时退回到派发开始时的快照，
///      因此正在处理事件的节点即便被移除也能继续向后转发；
///   3. 每个节点带有执行器，目标执行器不是当前线程时事件被投递过去，生命周期钩子同理；
///   4. 头部之外是 [`Transport`]，尾部之外是 [`InboundSink`]，二者都在通道执行器上调用。
/// - **契约（What）**：
///   - 节点名称在链内唯一；
///   - 变更可以在任意线程发起，`handler_added`/`handler_removed` 在节点执行器上执行；
///   - 调用方通过 `Arc<Pipeline>` 持有链路。
pub struct Pipeline {
    channel_id: ChannelId,
    executor: Arc<dyn EventExecutor>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn InboundSink>,
    nodes: NodeChain,
    mutation: Mutex<()>,
    close_future: ChannelPromise,
}

impl Pipeline {
    /// 构造空链路。
    pub fn new(
        channel_id: ChannelId,
        executor: Arc<dyn EventExecutor>,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn InboundSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            channel_id,
            executor,
            transport,
            sink,
            nodes: NodeChain::new(),
            mutation: Mutex::new(()),
            close_future: ChannelPromise::for_channel(channel_id),
        })
    }

    /// 所属通道。
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// 通道执行器。
    pub fn executor(&self) -> &Arc<dyn EventExecutor> {
        &self.executor
    }

    /// 通道关闭后完成的 Promise。
    pub fn close_future(&self) -> ChannelPromise {
        self.close_future.clone()
    }

    /// 当前逻辑纪元，每次链路变更后递增。
    pub fn epoch(&self) -> u64 {
        self.nodes.epoch()
    }

    /// 按链路顺序返回各节点的描述与当前状态。
    pub fn registrations(&self) -> Vec<HandlerRegistration> {
        self.nodes.registrations()
    }

    /// 按链路顺序返回节点名称。
    pub fn names(&self) -> Vec<String> {
        self.nodes.load().iter().map(|n| n.name.clone()).collect()
    }

    /// 节点数量。
    pub fn len(&self) -> usize {
        self.nodes.load().len()
    }

    /// 链路是否为空。
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按名称查找 Handler。
    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.nodes.find(name).map(|n| Arc::clone(&n.handler))
    }

    /// 节点状态。
    pub fn state_of(&self, name: &str) -> Option<NodeState> {
        self.nodes.find(name).map(|n| n.state())
    }

    /// 按名称获取节点上下文。
    pub fn context(self: &Arc<Self>, name: &str) -> Option<NodeContext> {
        let snapshot = self.nodes.load();
        let index = snapshot.iter().position(|n| n.name == name)?;
        let node = Arc::clone(&snapshot[index]);
        Some(NodeContext::new(Arc::clone(self), snapshot, index, node))
    }

    /// 插入到头部（最靠近传输侧）。
    pub fn add_first(self: &Arc<Self>, name: &str, handler: Arc<dyn Handler>) -> Result<()> {
        self.insert(Position::First, name, handler, None)
    }

    /// 插入到尾部（最靠近应用侧）。
    pub fn add_last(self: &Arc<Self>, name: &str, handler: Arc<dyn Handler>) -> Result<()> {
        self.insert(Position::Last, name, handler, None)
    }

    /// 插入到 `base` 之前。
    pub fn add_before(
        self: &Arc<Self>,
        base: &str,
        name: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<()> {
        self.insert(Position::Before(base), name, handler, None)
    }

    /// 插入到 `base` 之后。
    pub fn add_after(
        self: &Arc<Self>,
        base: &str,
        name: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<()> {
        self.insert(Position::After(base), name, handler, None)
    }

    /// 插入到尾部，并让该节点在指定执行器上运行。
    pub fn add_last_on(
        self: &Arc<Self>,
        executor: Arc<dyn EventExecutor>,
        name: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<()> {
        self.insert(Position::Last, name, handler, Some(executor))
    }

    fn insert(
        self: &Arc<Self>,
        position: Position<'_>,
        name: &str,
        handler: Arc<dyn Handler>,
        executor: Option<Arc<dyn EventExecutor>>,
    ) -> Result<()> {
        let executor = executor.unwrap_or_else(|| Arc::clone(&self.executor));
        let node = Arc::new(HandlerNode::new(name.to_owned(), handler, executor));
        let (snapshot, index) = {
            let _guard = self.mutation.lock();
            let current = self.nodes.load();
            if current.iter().any(|n| n.name == name) {
                return Err(duplicate_name(name));
            }
            let index = match position {
                Position::First => 0,
                Position::Last => current.len(),
                Position::Before(base) => position_of(&current, base)?,
                Position::After(base) => position_of(&current, base)? + 1,
            };
            let mut chain: Vec<_> = current.iter().cloned().collect();
            chain.insert(index, Arc::clone(&node));
            let chain = Arc::new(chain);
            self.commit_chain(Arc::clone(&chain), MutationKind::Add, name);
            (chain, index)
        };
        self.call_handler_added(snapshot, index, node);
        Ok(())
    }

    /// 移除节点并返回其 Handler。
    ///
    /// 可在任意线程调用；`handler_removed` 在节点执行器上执行。
    pub fn remove(self: &Arc<Self>, name: &str) -> Result<Arc<dyn Handler>> {
        let (snapshot, index, node) = {
            let _guard = self.mutation.lock();
            let current = self.nodes.load();
            let index = position_of(&current, name)?;
            let node = Arc::clone(&current[index]);
            node.mark_removed();
            let mut chain: Vec<_> = current.iter().cloned().collect();
            chain.remove(index);
            self.commit_chain(Arc::new(chain), MutationKind::Remove, name);
            (current, index, node)
        };
        let handler = Arc::clone(&node.handler);
        self.call_handler_removed(snapshot, index, node);
        Ok(handler)
    }

    /// 以新节点原位替换 `old`，返回被替换的 Handler。
    pub fn replace(
        self: &Arc<Self>,
        old: &str,
        new_name: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<Arc<dyn Handler>> {
        let (old_snapshot, new_snapshot, index, old_node, new_node) = {
            let _guard = self.mutation.lock();
            let current = self.nodes.load();
            let index = position_of(&current, old)?;
            if new_name != old && current.iter().any(|n| n.name == new_name) {
                return Err(duplicate_name(new_name));
            }
            let old_node = Arc::clone(&current[index]);
            let new_node = Arc::new(HandlerNode::new(
                new_name.to_owned(),
                handler,
                Arc::clone(&old_node.executor),
            ));
            old_node.mark_removed();
            let mut chain: Vec<_> = current.iter().cloned().collect();
            chain[index] = Arc::clone(&new_node);
            let chain = Arc::new(chain);
            self.commit_chain(Arc::clone(&chain), MutationKind::Replace, new_name);
            (current, chain, index, old_node, new_node)
        };
        let replaced = Arc::clone(&old_node.handler);
        self.call_handler_added(new_snapshot, index, new_node);
        self.call_handler_removed(old_snapshot, index, old_node);
        Ok(replaced)
    }

    /// 自尾向头移除全部节点，通道注销时调用。
    pub fn destroy(self: &Arc<Self>) {
        while let Some(name) = self.nodes.load().last().map(|n| n.name.clone()) {
            // 并发移除可能已经摘掉该节点，失败时直接处理新的尾节点。
            let _ = self.remove(&name);
        }
    }

    fn commit_chain(&self, chain: Snapshot, mutation: MutationKind, name: &str) {
        let epoch = self.nodes.publish(chain);
        tracing::debug!(
            channel = %self.channel_id,
            op = mutation.as_label(),
            handler = name,
            epoch,
            "pipeline.mutation applied epoch={epoch}"
        );
    }

    fn call_handler_added(self: &Arc<Self>, snapshot: Snapshot, index: usize, node: Arc<HandlerNode>) {
        let executor = Arc::clone(&node.executor);
        let ctx = NodeContext::new(Arc::clone(self), snapshot, index, node);
        let submitted = run_on(&executor, move || {
            ctx.node.handler.handler_added(&ctx);
            if !ctx.node.mark_active() {
                tracing::trace!(
                    channel = %ctx.pipeline.channel_id,
                    handler = %ctx.node.name,
                    "handler removed before activation"
                );
            }
        });
        if let Err(err) = submitted {
            self.log_rejected(&err, "handler_added");
        }
    }

    fn call_handler_removed(
        self: &Arc<Self>,
        snapshot: Snapshot,
        index: usize,
        node: Arc<HandlerNode>,
    ) {
        let executor = Arc::clone(&node.executor);
        let ctx = NodeContext::new(Arc::clone(self), snapshot, index, node);
        let submitted = run_on(&executor, move || ctx.node.handler.handler_removed(&ctx));
        if let Err(err) = submitted {
            self.log_rejected(&err, "handler_removed");
        }
    }

    fn dispatch_inbound(self: &Arc<Self>, snapshot: Snapshot, start: usize, event: InboundEvent) {
        let next = snapshot
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, n)| n.inbound && n.is_active())
            .map(|(index, _)| index);
        let submitted = match next {
            Some(index) => {
                let node = Arc::clone(&snapshot[index]);
                let executor = Arc::clone(&node.executor);
                let ctx = NodeContext::new(Arc::clone(self), snapshot, index, node);
                run_on(&executor, move || ctx.invoke_inbound(event))
            }
            None => {
                let pipeline = Arc::clone(self);
                run_on(&self.executor, move || {
                    event.into_sink(pipeline.sink.as_ref(), pipeline.channel_id)
                })
            }
        };
        if let Err(err) = submitted {
            self.log_rejected(&err, "inbound");
        }
    }

    fn dispatch_outbound(self: &Arc<Self>, snapshot: Snapshot, end: usize, event: OutboundEvent) {
        let end = end.min(snapshot.len());
        let previous = snapshot[..end]
            .iter()
            .rposition(|n| n.outbound && n.is_active());
        let promise = event.promise().cloned();
        let submitted = match previous {
            Some(index) => {
                let node = Arc::clone(&snapshot[index]);
                let executor = Arc::clone(&node.executor);
                let ctx = NodeContext::new(Arc::clone(self), snapshot, index, node);
                run_on(&executor, move || ctx.invoke_outbound(event))
            }
            None => {
                let pipeline = Arc::clone(self);
                run_on(&self.executor, move || pipeline.invoke_transport(event))
            }
        };
        // 被拒绝的事件不会再到达任何节点，其 Promise 只能在这里完成。
        if let Err(err) = submitted {
            self.log_rejected(&err, "outbound");
            if let Some(promise) = promise {
                promise.try_failure(err);
            }
        }
    }

    fn log_rejected(&self, err: &CoreError, stage: &'static str) {
        tracing::warn!(
            channel = %self.channel_id,
            stage,
            error = %err,
            "pipeline event dropped by a closed executor"
        );
    }

    fn invoke_transport(&self, event: OutboundEvent) {
        if let OutboundEvent::Close(promise) = &event {
            let close_future = self.close_future.clone();
            promise.add_listener(move |p| {
                if p.is_success() {
                    close_future.try_success();
                }
            });
        }
        event.into_transport(self.transport.as_ref());
    }

    fn fire_from_head(self: &Arc<Self>, event: InboundEvent) {
        self.dispatch_inbound(self.nodes.load(), 0, event);
    }

    fn send_from_tail(self: &Arc<Self>, event: OutboundEvent) {
        let snapshot = self.nodes.load();
        let end = snapshot.len();
        self.dispatch_outbound(snapshot, end, event);
    }

    fn new_promise(&self) -> ChannelPromise {
        ChannelPromise::for_channel(self.channel_id)
    }

    /// 从头部触发通道注册事件。
    pub fn fire_channel_registered(self: &Arc<Self>) {
        self.fire_from_head(InboundEvent::Registered);
    }

    /// 从头部触发通道注销事件。
    pub fn fire_channel_unregistered(self: &Arc<Self>) {
        self.fire_from_head(InboundEvent::Unregistered);
    }

    /// 从头部触发通道活跃事件。
    pub fn fire_channel_active(self: &Arc<Self>) {
        self.fire_from_head(InboundEvent::Active);
    }

    /// 从头部触发通道失活事件。
    pub fn fire_channel_inactive(self: &Arc<Self>) {
        self.fire_from_head(InboundEvent::Inactive);
    }

    /// 从头部派发读到的消息。
    pub fn fire_read(self: &Arc<Self>, msg: PipelineMessage) {
        self.fire_from_head(InboundEvent::Read(msg));
    }

    /// 从头部派发读批次结束事件。
    pub fn fire_read_complete(self: &Arc<Self>) {
        self.fire_from_head(InboundEvent::ReadComplete);
    }

    /// 从头部派发用户事件。
    pub fn fire_user_event(self: &Arc<Self>, event: UserEvent) {
        self.fire_from_head(InboundEvent::UserEvent(event));
    }

    /// 从头部派发可写性变化。
    pub fn fire_writability_changed(self: &Arc<Self>, is_writable: bool) {
        self.fire_from_head(InboundEvent::WritabilityChanged(is_writable));
    }

    /// 从头部派发异常。
    pub fn fire_exception_caught(self: &Arc<Self>, error: CoreError) {
        self.fire_from_head(InboundEvent::ExceptionCaught(error));
    }

    /// 从尾部发起绑定。
    pub fn bind(self: &Arc<Self>, local: SocketAddr) -> ChannelPromise {
        let promise = self.new_promise();
        self.send_from_tail(OutboundEvent::Bind(local, promise.clone()));
        promise
    }

    /// 从尾部发起连接。
    pub fn connect(self: &Arc<Self>, remote: SocketAddr, local: Option<SocketAddr>) -> ChannelPromise {
        let promise = self.new_promise();
        self.send_from_tail(OutboundEvent::Connect(remote, local, promise.clone()));
        promise
    }

    /// 从尾部发起断开。
    pub fn disconnect(self: &Arc<Self>) -> ChannelPromise {
        let promise = self.new_promise();
        self.send_from_tail(OutboundEvent::Disconnect(promise.clone()));
        promise
    }

    /// 从尾部发起关闭。
    pub fn close(self: &Arc<Self>) -> ChannelPromise {
        let promise = self.new_promise();
        self.send_from_tail(OutboundEvent::Close(promise.clone()));
        promise
    }

    /// 从尾部发起注销。
    pub fn deregister(self: &Arc<Self>) -> ChannelPromise {
        let promise = self.new_promise();
        self.send_from_tail(OutboundEvent::Deregister(promise.clone()));
        promise
    }

    /// 从尾部请求读取。
    pub fn read(self: &Arc<Self>) {
        self.send_from_tail(OutboundEvent::Read);
    }

    /// 从尾部写入消息。
    pub fn write(self: &Arc<Self>, msg: PipelineMessage) -> ChannelPromise {
        let promise = self.new_promise();
        self.write_with(msg, promise.clone());
        promise
    }

    /// 以调用方提供的 Promise 写入消息。
    pub fn write_with(self: &Arc<Self>, msg: PipelineMessage, promise: ChannelPromise) {
        self.send_from_tail(OutboundEvent::Write(msg, promise));
    }

    /// 从尾部刷新。
    pub fn flush(self: &Arc<Self>) {
        self.send_from_tail(OutboundEvent::Flush);
    }

    /// 写入并刷新。
    pub fn write_and_flush(self: &Arc<Self>, msg: PipelineMessage) -> ChannelPromise {
        let promise = self.write(msg);
        self.flush();
        promise
    }
}

fn duplicate_name(name: &str) -> CoreError {
    CoreError::new(
        codes::PIPELINE_DUPLICATE_NAME,
        format!("duplicate handler name: `{name}`"),
    )
}

/// 事件派发时注入 Handler 的节点上下文。
///
/// 持有派发开始时的快照与节点位置；节点被移出最新快照后，转发退回到这份快照上继续进行。
#[derive(Clone)]
pub struct NodeContext {
    pipeline: Arc<Pipeline>,
    snapshot: Snapshot,
    index: usize,
    node: Arc<HandlerNode>,
}

impl NodeContext {
    fn new(pipeline: Arc<Pipeline>, snapshot: Snapshot, index: usize, node: Arc<HandlerNode>) -> Self {
        Self {
            pipeline,
            snapshot,
            index,
            node,
        }
    }

    /// 节点当前状态。
    pub fn state(&self) -> NodeState {
        self.node.state()
    }

    /// 在最新快照中定位自身；已被移出时退回派发快照。
    fn locate(&self) -> (Snapshot, usize) {
        let current = self.pipeline.nodes.load();
        match current.iter().position(|n| Arc::ptr_eq(n, &self.node)) {
            Some(position) => (current, position),
            None => (Arc::clone(&self.snapshot), self.index),
        }
    }

    fn forward_inbound(&self, event: InboundEvent) {
        let (snapshot, position) = self.locate();
        self.pipeline.dispatch_inbound(snapshot, position + 1, event);
    }

    fn forward_outbound(&self, event: OutboundEvent) {
        let (snapshot, position) = self.locate();
        self.pipeline.dispatch_outbound(snapshot, position, event);
    }

    fn invoke_inbound(&self, event: InboundEvent) {
        // 投递期间节点可能已被移除，此时视为透传。
        match self.node.handler.inbound() {
            Some(handler) if self.node.is_active() => event.deliver(handler, self),
            _ => self.forward_inbound(event),
        }
    }

    fn invoke_outbound(&self, event: OutboundEvent) {
        match self.node.handler.outbound() {
            Some(handler) if self.node.is_active() => event.deliver(handler, self),
            _ => self.forward_outbound(event),
        }
    }
}

impl Context for NodeContext {
    fn name(&self) -> &str {
        &self.node.name
    }

    fn channel_id(&self) -> ChannelId {
        self.pipeline.channel_id
    }

    fn pipeline(&self) -> Arc<Pipeline> {
        Arc::clone(&self.pipeline)
    }

    fn executor(&self) -> Arc<dyn EventExecutor> {
        Arc::clone(&self.node.executor)
    }

    fn handler(&self) -> Arc<dyn Handler> {
        Arc::clone(&self.node.handler)
    }

    fn is_removed(&self) -> bool {
        self.node.state() == NodeState::Removed
    }

    fn fire_channel_registered(&self) {
        self.forward_inbound(InboundEvent::Registered);
    }

    fn fire_channel_unregistered(&self) {
        self.forward_inbound(InboundEvent::Unregistered);
    }

    fn fire_channel_active(&self) {
        self.forward_inbound(InboundEvent::Active);
    }

    fn fire_channel_inactive(&self) {
        self.forward_inbound(InboundEvent::Inactive);
    }

    fn fire_read(&self, msg: PipelineMessage) {
        self.forward_inbound(InboundEvent::Read(msg));
    }

    fn fire_read_complete(&self) {
        self.forward_inbound(InboundEvent::ReadComplete);
    }

    fn fire_user_event(&self, event: UserEvent) {
        self.forward_inbound(InboundEvent::UserEvent(event));
    }

    fn fire_writability_changed(&self, is_writable: bool) {
        self.forward_inbound(InboundEvent::WritabilityChanged(is_writable));
    }

    fn fire_exception_caught(&self, error: CoreError) {
        self.forward_inbound(InboundEvent::ExceptionCaught(error));
    }

    fn bind(&self, local: SocketAddr, promise: ChannelPromise) {
        self.forward_outbound(OutboundEvent::Bind(local, promise));
    }

    fn connect(&self, remote: SocketAddr, local: Option<SocketAddr>, promise: ChannelPromise) {
        self.forward_outbound(OutboundEvent::Connect(remote, local, promise));
    }

    fn disconnect(&self, promise: ChannelPromise) {
        self.forward_outbound(OutboundEvent::Disconnect(promise));
    }

    fn close(&self, promise: ChannelPromise) {
        self.forward_outbound(OutboundEvent::Close(promise));
    }

    fn deregister(&self, promise: ChannelPromise) {
        self.forward_outbound(OutboundEvent::Deregister(promise));
    }

    fn read(&self) {
        self.forward_outbound(OutboundEvent::Read);
    }

    fn write(&self, msg: PipelineMessage, promise: ChannelPromise) {
        self.forward_outbound(OutboundEvent::Write(msg, promise));
    }

    fn flush(&self) {
        self.forward_outbound(OutboundEvent::Flush);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::DiscardTransport,
        executor::ImmediateExecutor,
        pipeline::{DiscardingSink, InboundHandler, handler_from_inbound},
    };

    struct Passthrough;

    impl InboundHandler for Passthrough {}

    fn pipeline() -> Arc<Pipeline> {
        Pipeline::new(
            ChannelId::next(),
            ImmediateExecutor::shared(),
            Arc::new(DiscardTransport),
            Arc::new(DiscardingSink),
        )
    }

    #[test]
    fn positional_inserts_follow_anchor() {
        let p = pipeline();
        p.add_last("b", handler_from_inbound(Passthrough)).expect("add b");
        p.add_first("a", handler_from_inbound(Passthrough)).expect("add a");
        p.add_last("d", handler_from_inbound(Passthrough)).expect("add d");
        p.add_before("d", "c", handler_from_inbound(Passthrough))
            .expect("add c");
        p.add_after("d", "e", handler_from_inbound(Passthrough))
            .expect("add e");
        assert_eq!(p.names(), ["a", "b", "c", "d", "e"]);
        assert_eq!(p.epoch(), 5);
        let registrations = p.registrations();
        assert_eq!(registrations.len(), 5);
        assert!(registrations.iter().all(|r| r.state() == NodeState::Active));
    }

    #[test]
    fn duplicate_and_missing_names_are_rejected() {
        let p = pipeline();
        p.add_last("a", handler_from_inbound(Passthrough)).expect("add a");
        let err = p
            .add_last("a", handler_from_inbound(Passthrough))
            .expect_err("重名应失败");
        assert_eq!(err.code(), codes::PIPELINE_DUPLICATE_NAME);
        let err = p
            .add_before("zz", "b", handler_from_inbound(Passthrough))
            .expect_err("锚点不存在");
        assert_eq!(err.code(), codes::PIPELINE_HANDLER_NOT_FOUND);
        assert_eq!(
            p.remove("zz").err().map(|e| e.code()),
            Some(codes::PIPELINE_HANDLER_NOT_FOUND)
        );
        assert_eq!(p.names(), ["a"]);
    }

    #[test]
    fn node_states_progress_added_active_removed() {
        let p = pipeline();
        p.add_last("a", handler_from_inbound(Passthrough)).expect("add a");
        assert_eq!(p.state_of("a"), Some(NodeState::Active));
        let ctx = p.context("a").expect("上下文");
        assert!(!ctx.is_removed());
        p.remove("a").expect("remove a");
        assert_eq!(ctx.state(), NodeState::Removed);
        assert!(ctx.is_removed());
        assert_eq!(p.state_of("a"), None);
    }

    #[test]
    fn replace_keeps_position_and_returns_old_handler() {
        let p = pipeline();
        let first = handler_from_inbound(Passthrough);
        p.add_last("a", Arc::clone(&first)).expect("add a");
        p.add_last("b", handler_from_inbound(Passthrough)).expect("add b");
        let old = p
            .replace("a", "a2", handler_from_inbound(Passthrough))
            .expect("replace");
        assert!(Arc::ptr_eq(&old, &first));
        assert_eq!(p.names(), ["a2", "b"]);
        let err = p
            .replace("a2", "b", handler_from_inbound(Passthrough))
            .err()
            .expect("新名称与其他节点冲突");
        assert_eq!(err.code(), codes::PIPELINE_DUPLICATE_NAME);
    }

    #[test]
    fn destroy_removes_every_node() {
        let p = pipeline();
        for name in ["a", "b", "c"] {
            p.add_last(name, handler_from_inbound(Passthrough)).expect("add");
        }
        p.destroy();
        assert!(p.is_empty());
    }
}
