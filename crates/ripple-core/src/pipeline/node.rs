//! 链路节点与节点链的发布。
//!
//! # 设计背景（Why）
//! - 派发线程需要无锁读取一份稳定的节点序列，变更线程需要整体替换序列而不打断正在进行的遍历；
//! - 节点是否接收事件由它自己的生命周期状态决定，而不是由“是否仍在最新序列里”决定：
//!   已被摘除的节点仍可能出现在旧快照中，派发方据状态跳过它。
//!
//! # 逻辑解析（How）
//! - [`HandlerNode`] 持有 Handler、执行器与原子状态，状态只沿 `Added → Active → Removed` 前进；
//! - [`NodeChain`] 以 `ArcSwap` 发布节点序列，`publish` 在替换序列的同时推进纪元；
//! - [`HandlerRegistration`] 是对外的只读描述，按需从当前序列生成，状态随节点实时变化。
//!
//! # 风险与考量（Trade-offs）
//! - 每次变更复制整条序列，代价与链长成正比；链路变更远少于事件派发；
//! - 纪元只是单调计数，变更的线性化由 Pipeline 的互斥锁保证。

use std::sync::{
    Arc,
    atomic::{AtomicU8, AtomicU64, Ordering},
};

use arc_swap::ArcSwap;

use crate::{CoreError, Result, error::codes, executor::EventExecutor};

use super::handler::{Handler, HandlerDescriptor};

/// 节点生命周期状态：`Added → Active → Removed`。
///
/// - `Added`：已链入，`handler_added` 尚未在节点执行器上完成，事件会跳过该节点；
/// - `Active`：正常接收事件；
/// - `Removed`：终态，后续查找跳过该节点，已经交付给它的事件可以执行完毕。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeState {
    /// 已链入，等待 `handler_added` 完成。
    Added = 0,
    /// 接收事件。
    Active = 1,
    /// 已移除。
    Removed = 2,
}

impl NodeState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Added,
            1 => Self::Active,
            _ => Self::Removed,
        }
    }
}

/// 链路中的单个节点。
///
/// 入站/出站能力在构造时缓存，派发路径只读取布尔值与原子状态。
pub(crate) struct HandlerNode {
    pub(super) name: String,
    pub(super) handler: Arc<dyn Handler>,
    pub(super) executor: Arc<dyn EventExecutor>,
    pub(super) inbound: bool,
    pub(super) outbound: bool,
    descriptor: HandlerDescriptor,
    state: AtomicU8,
}

impl HandlerNode {
    pub(super) fn new(
        name: String,
        handler: Arc<dyn Handler>,
        executor: Arc<dyn EventExecutor>,
    ) -> Self {
        Self {
            descriptor: handler.describe(),
            inbound: handler.inbound().is_some(),
            outbound: handler.outbound().is_some(),
            name,
            handler,
            executor,
            state: AtomicU8::new(NodeState::Added as u8),
        }
    }

    pub(super) fn state(&self) -> NodeState {
        NodeState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub(super) fn is_active(&self) -> bool {
        self.state() == NodeState::Active
    }

    /// `Added → Active`；节点已被移除时保持 `Removed` 并返回 `false`。
    pub(super) fn mark_active(&self) -> bool {
        self.state
            .compare_exchange(
                NodeState::Added as u8,
                NodeState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(super) fn mark_removed(&self) {
        self.state.store(NodeState::Removed as u8, Ordering::Release);
    }

    fn registration(&self) -> HandlerRegistration {
        HandlerRegistration {
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
            executor: self.executor.name().to_owned(),
            inbound: self.inbound,
            outbound: self.outbound,
            state: self.state(),
        }
    }
}

/// 一次发布的节点序列。
pub(super) type Snapshot = Arc<Vec<Arc<HandlerNode>>>;

/// 以快照方式发布的节点序列及其纪元。
pub(super) struct NodeChain {
    nodes: ArcSwap<Vec<Arc<HandlerNode>>>,
    epoch: AtomicU64,
}

impl NodeChain {
    pub(super) fn new() -> Self {
        Self {
            nodes: ArcSwap::from_pointee(Vec::new()),
            epoch: AtomicU64::new(0),
        }
    }

    pub(super) fn load(&self) -> Snapshot {
        self.nodes.load_full()
    }

    pub(super) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// 替换节点序列并返回新的纪元；调用方须持有 Pipeline 的变更锁。
    pub(super) fn publish(&self, chain: Snapshot) -> u64 {
        self.nodes.store(chain);
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// 当前序列中名为 `name` 的节点。
    pub(super) fn find(&self, name: &str) -> Option<Arc<HandlerNode>> {
        self.load().iter().find(|n| n.name == name).cloned()
    }

    pub(super) fn registrations(&self) -> Vec<HandlerRegistration> {
        self.load().iter().map(|n| n.registration()).collect()
    }
}

/// 节点在 `snapshot` 中的位置，不存在时返回 `pipeline.handler_not_found`。
pub(super) fn position_of(snapshot: &[Arc<HandlerNode>], name: &str) -> Result<usize> {
    snapshot.iter().position(|n| n.name == name).ok_or_else(|| {
        CoreError::new(
            codes::PIPELINE_HANDLER_NOT_FOUND,
            format!("no handler named `{name}`"),
        )
    })
}

/// 节点的对外描述，按链路顺序排列。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerRegistration {
    name: String,
    descriptor: HandlerDescriptor,
    executor: String,
    inbound: bool,
    outbound: bool,
    state: NodeState,
}

impl HandlerRegistration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &HandlerDescriptor {
        &self.descriptor
    }

    /// 节点执行器名称。
    pub fn executor(&self) -> &str {
        &self.executor
    }

    pub fn is_inbound(&self) -> bool {
        self.inbound
    }

    pub fn is_outbound(&self) -> bool {
        self.outbound
    }

    /// 生成描述时节点所处的状态。
    pub fn state(&self) -> NodeState {
        self.state
    }
}
