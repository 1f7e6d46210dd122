use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context as TaskContext, Poll},
};

use spin::Mutex;

use crate::{
    CoreError, SharedError,
    channel::{ChannelId, ChannelPromise},
    error::codes,
};

use super::error::ChannelGroupError;

#[derive(Default)]
struct Counters {
    success: usize,
    failure: usize,
}

struct GroupInner {
    entries: Vec<(ChannelId, ChannelPromise)>,
    counters: Mutex<Counters>,
    aggregate: ChannelPromise,
}

impl GroupInner {
    fn on_member_done(&self, member: &ChannelPromise) {
        let finished = {
            let mut counters = self.counters.lock();
            if member.is_success() {
                counters.success += 1;
            } else {
                counters.failure += 1;
            }
            counters.success + counters.failure == self.entries.len()
        };
        // 只有观察到计数越过边界的线程会走到这里，聚合结果因此只决定一次。
        if finished {
            self.complete();
        }
    }

    fn complete(&self) {
        let failures: Vec<_> = self
            .entries
            .iter()
            .filter_map(|(id, promise)| promise.cause().map(|cause| (*id, cause)))
            .collect();
        if failures.is_empty() {
            self.aggregate.try_success();
            return;
        }
        let error = ChannelGroupError::new(self.entries.len(), failures);
        tracing::debug!(
            failed = error.failures().len(),
            total = error.total(),
            "channel group operation failed"
        );
        self.aggregate.try_failure(
            CoreError::new(codes::CHANNEL_GROUP_FAILURE, error.to_string()).with_cause(error),
        );
    }
}

/// 一组通道操作的聚合完成视图。
///
/// # 教案式说明
/// - **意图（Why）**：向多个通道广播写入或关闭时，调用方需要一个整体结果，同时保留逐通道的明细。
/// - **逻辑（How）**：
///   1. 构造时为每个成员 Promise 注册监听器，成功/失败计数放在同一把 `spin::Mutex` 下；
///   2. 计数达到成员总数的那一次回调负责完成聚合 Promise，锁在完成前释放，
///      聚合监听器因此不会在锁内运行；
///   3. 存在失败成员时，聚合原因为 [`ChannelGroupError`]，按成员顺序列出 `(通道, 原因)`。
/// - **契约（What）**：
///   - 零个成员时立即成功；
///   - 聚合结果恰好完成一次；
///   - 不提供部分取消，`cancel` 只作用于成员自身的 Promise。
/// - **风险（Trade-offs）**：成员监听器持有内部状态的强引用，直到成员完成为止；
///   永不完成的成员会让这份状态一直存活。
#[derive(Clone)]
pub struct ChannelGroupFuture {
    inner: Arc<GroupInner>,
}

impl ChannelGroupFuture {
    /// 以 `(通道, Promise)` 序列构造聚合视图。
    pub fn new(members: impl IntoIterator<Item = (ChannelId, ChannelPromise)>) -> Self {
        let inner = Arc::new(GroupInner {
            entries: members.into_iter().collect(),
            counters: Mutex::new(Counters::default()),
            aggregate: ChannelPromise::new(),
        });
        if inner.entries.is_empty() {
            inner.aggregate.try_success();
        } else {
            for (_, promise) in &inner.entries {
                let listener = Arc::clone(&inner);
                promise.add_listener(move |done| listener.on_member_done(done));
            }
        }
        Self { inner }
    }

    /// 成员数量。
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// 是否没有成员。
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// 查找指定通道的 Promise。
    pub fn find(&self, channel: ChannelId) -> Option<&ChannelPromise> {
        self.inner
            .entries
            .iter()
            .find(|(id, _)| *id == channel)
            .map(|(_, promise)| promise)
    }

    /// 按构造顺序遍历成员。
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &ChannelPromise)> + '_ {
        self.inner
            .entries
            .iter()
            .map(|(id, promise)| (*id, promise))
    }

    /// 聚合 Promise。
    pub fn aggregate(&self) -> ChannelPromise {
        self.inner.aggregate.clone()
    }

    /// 聚合结果是否已完成。
    pub fn is_done(&self) -> bool {
        self.inner.aggregate.is_done()
    }

    /// 全部成员是否成功。
    pub fn is_success(&self) -> bool {
        self.inner.aggregate.is_success()
    }

    /// 至少一个但并非全部成员成功。
    pub fn is_partial_success(&self) -> bool {
        let success = self.inner.counters.lock().success;
        success != 0 && success != self.len()
    }

    /// 至少一个但并非全部成员失败。
    pub fn is_partial_failure(&self) -> bool {
        let failure = self.inner.counters.lock().failure;
        failure != 0 && failure != self.len()
    }

    /// 聚合失败原因。
    pub fn cause(&self) -> Option<SharedError> {
        self.inner.aggregate.cause()
    }

    /// 聚合失败的逐通道明细。
    pub fn group_error(&self) -> Option<ChannelGroupError> {
        let cause = self.cause()?;
        cause
            .cause()?
            .downcast_ref::<ChannelGroupError>()
            .cloned()
    }

    /// 聚合完成后调用；已完成时立即在当前线程调用。
    pub fn add_listener(&self, listener: impl FnOnce(&ChannelGroupFuture) + Send + 'static) {
        let this = self.clone();
        self.inner
            .aggregate
            .add_listener(move |_| listener(&this));
    }
}

impl Future for ChannelGroupFuture {
    type Output = Result<(), SharedError>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let mut aggregate = self.inner.aggregate.clone();
        Pin::new(&mut aggregate).poll(cx)
    }
}

impl fmt::Debug for ChannelGroupFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelGroupFuture")
            .field("members", &self.len())
            .field("done", &self.is_done())
            .field("success", &self.is_success())
            .finish()
    }
}
