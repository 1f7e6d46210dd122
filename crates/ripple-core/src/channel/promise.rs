use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use spin::Mutex;

use crate::error::{CoreError, SharedError, codes};

use super::ChannelId;

type Listener = Box<dyn FnOnce(&ChannelPromise) + Send + 'static>;

/// 单次完成的通道操作结果。
///
/// # 教案式说明
/// - **意图（Why）**：出站操作（写、连接、关闭）是异步的，调用方需要一个可以注册回调、
///   也可以 `.await` 的句柄；通道组聚合同样建立在监听回调之上。
/// - **逻辑（How）**：状态存放在 `spin::Mutex` 中；完成时在锁内写入结果并取出监听器与 waker，
///   释放锁后再依次调用，避免回调重入时自锁。
/// - **契约（What）**：
///   - 结果只能写入一次，后续 `try_*` 返回 `false`；
///   - 监听器在完成线程上执行，注册时若已完成则立即在注册线程上执行；
///   - 取消视为失败，原因码为 `operation.cancelled`。
#[derive(Clone)]
pub struct ChannelPromise {
    inner: Arc<PromiseInner>,
}

struct PromiseInner {
    channel: Option<ChannelId>,
    state: Mutex<PromiseState>,
}

#[derive(Default)]
struct PromiseState {
    outcome: Option<Outcome>,
    listeners: Vec<Listener>,
    wakers: Vec<Waker>,
}

#[derive(Clone)]
enum Outcome {
    Success,
    Failure(SharedError),
    Cancelled(SharedError),
}

impl Default for ChannelPromise {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelPromise {
    /// 创建不关联通道的 Promise。
    pub fn new() -> Self {
        Self::with_channel(None)
    }

    /// 创建关联到指定通道的 Promise。
    pub fn for_channel(channel: ChannelId) -> Self {
        Self::with_channel(Some(channel))
    }

    fn with_channel(channel: Option<ChannelId>) -> Self {
        Self {
            inner: Arc::new(PromiseInner {
                channel,
                state: Mutex::new(PromiseState::default()),
            }),
        }
    }

    /// 创建已成功的 Promise。
    pub fn succeeded(channel: Option<ChannelId>) -> Self {
        let promise = Self::with_channel(channel);
        promise.try_success();
        promise
    }

    /// 创建已失败的 Promise。
    pub fn failed(channel: Option<ChannelId>, cause: CoreError) -> Self {
        let promise = Self::with_channel(channel);
        promise.try_failure(cause);
        promise
    }

    /// 关联的通道。
    pub fn channel_id(&self) -> Option<ChannelId> {
        self.inner.channel
    }

    /// 标记成功；已完成时返回 `false`。
    pub fn try_success(&self) -> bool {
        self.complete(Outcome::Success)
    }

    /// 标记失败；已完成时返回 `false`。
    pub fn try_failure(&self, cause: CoreError) -> bool {
        self.complete(Outcome::Failure(Arc::new(cause)))
    }

    /// 以共享原因标记失败。
    pub fn try_failure_shared(&self, cause: SharedError) -> bool {
        self.complete(Outcome::Failure(cause))
    }

    /// 取消操作；已完成时返回 `false`。
    pub fn cancel(&self) -> bool {
        let cause = Arc::new(CoreError::new(
            codes::OPERATION_CANCELLED,
            "operation cancelled",
        ));
        self.complete(Outcome::Cancelled(cause))
    }

    /// 是否已完成（成功、失败或取消）。
    pub fn is_done(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    /// 是否成功完成。
    pub fn is_success(&self) -> bool {
        matches!(self.inner.state.lock().outcome, Some(Outcome::Success))
    }

    /// 是否被取消。
    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner.state.lock().outcome, Some(Outcome::Cancelled(_)))
    }

    /// 失败或取消的原因；未完成或成功时为 `None`。
    pub fn cause(&self) -> Option<SharedError> {
        match &self.inner.state.lock().outcome {
            Some(Outcome::Failure(cause)) | Some(Outcome::Cancelled(cause)) => {
                Some(Arc::clone(cause))
            }
            _ => None,
        }
    }

    /// 注册完成回调。
    pub fn add_listener(&self, listener: impl FnOnce(&ChannelPromise) + Send + 'static) {
        {
            let mut state = self.inner.state.lock();
            if state.outcome.is_none() {
                state.listeners.push(Box::new(listener));
                return;
            }
        }
        listener(self);
    }

    /// 两个句柄是否指向同一个 Promise。
    pub fn ptr_eq(&self, other: &ChannelPromise) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn complete(&self, outcome: Outcome) -> bool {
        let (listeners, wakers) = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome);
            (
                std::mem::take(&mut state.listeners),
                std::mem::take(&mut state.wakers),
            )
        };
        for listener in listeners {
            listener(self);
        }
        for waker in wakers {
            waker.wake();
        }
        true
    }
}

impl Future for ChannelPromise {
    type Output = Result<(), SharedError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.inner.state.lock();
        match &state.outcome {
            Some(Outcome::Success) => Poll::Ready(Ok(())),
            Some(Outcome::Failure(cause)) | Some(Outcome::Cancelled(cause)) => {
                Poll::Ready(Err(Arc::clone(cause)))
            }
            None => {
                if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    state.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl fmt::Debug for ChannelPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.inner.state.lock().outcome {
            None => "pending",
            Some(Outcome::Success) => "success",
            Some(Outcome::Failure(_)) => "failure",
            Some(Outcome::Cancelled(_)) => "cancelled",
        };
        f.debug_struct("ChannelPromise")
            .field("channel", &self.inner.channel)
            .field("state", &state)
            .finish()
    }
}
