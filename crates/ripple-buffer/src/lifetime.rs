//! 缓冲存储与生命周期记录。
//!
//! # 设计背景（Why）
//! - 同一块存储会被根缓冲、切片与复制视图共享，而“何时归还存储”只取决于引用计数，
//!   与 Rust 句柄的 `Drop` 无关；因此把存储（[`Chunk`]）与计数（[`Lifetime`]）拆成两个共享对象。
//! - 切片与保留型复制视图拥有自己的 [`Lifetime`]，其回收动作是“释放父记录一次”，
//!   父存储因而不会在任何切片存活时被归还。
//!
//! # 逻辑解析（How）
//! - 计数降为 0 的那次 `release` 取出 [`Deallocation`] 并执行，`Mutex<Option<_>>` 保证只执行一次；
//! - 最后一个句柄被丢弃而计数仍为正时视为泄漏：记录 warn 日志（附最后一次 `touch` 提示）
//!   并照常回收，存储不会因此丢失。

use std::{ops::Range, sync::Arc};

use bytes::BytesMut;
use ripple_core::{CoreError, RefCount, Result, error::codes};
use spin::{Mutex, RwLock};

/// 共享的底层存储，长度始终等于已分配容量。
///
/// 计数归零时存储被取走，之后的任何访问都在同一把锁下被拒绝；
/// 因此“检查计数”与“访问存储”之间被其他线程释放时，调用方得到错误而不是越界。
pub(crate) struct Chunk {
    storage: RwLock<Option<BytesMut>>,
}

impl Chunk {
    pub(crate) fn new(storage: BytesMut) -> Arc<Self> {
        Arc::new(Self {
            storage: RwLock::new(Some(storage)),
        })
    }

    pub(crate) fn read<R>(&self, range: Range<usize>, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let storage = self.storage.read();
        let bytes = storage
            .as_ref()
            .and_then(|storage| storage.get(range))
            .ok_or_else(storage_released)?;
        Ok(f(bytes))
    }

    pub(crate) fn write<R>(
        &self,
        range: Range<usize>,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R> {
        let mut storage = self.storage.write();
        let bytes = storage
            .as_mut()
            .and_then(|storage| storage.get_mut(range))
            .ok_or_else(storage_released)?;
        Ok(f(bytes))
    }

    /// 把存储扩展到 `new_len`，新增部分填零。
    pub(crate) fn grow(&self, new_len: usize) -> Result<()> {
        let mut storage = self.storage.write();
        let storage = storage.as_mut().ok_or_else(storage_released)?;
        if storage.len() < new_len {
            storage.resize(new_len, 0);
        }
        Ok(())
    }

    fn take(&self) -> Option<BytesMut> {
        self.storage.write().take()
    }
}

fn storage_released() -> CoreError {
    CoreError::new(
        codes::BUFFER_ILLEGAL_REFERENCE_COUNT,
        "refCnt: 0, storage already released",
    )
}

/// 被回收的存储及其来源 Arena。
pub(crate) struct ReclaimedChunk {
    pub(crate) arena: usize,
    pub(crate) storage: BytesMut,
}

/// 池在存储生命周期结束时的回收入口。
pub(crate) trait BufferRecycler: Send + Sync + 'static {
    fn reclaim(&self, reclaimed: ReclaimedChunk);
}

/// 计数归零时执行的回收动作。
pub(crate) enum Deallocation {
    /// 归还或丢弃存储。
    Storage {
        chunk: Arc<Chunk>,
        recycler: Option<(Arc<dyn BufferRecycler>, usize)>,
    },
    /// 释放父记录一次。
    Parent(Arc<Lifetime>),
}

impl Deallocation {
    fn run(self) {
        match self {
            Deallocation::Storage { chunk, recycler } => {
                let storage = chunk.take();
                if let (Some(storage), Some((recycler, arena))) = (storage, recycler) {
                    recycler.reclaim(ReclaimedChunk { arena, storage });
                }
            }
            Deallocation::Parent(parent) => {
                if let Err(err) = parent.release_n(1) {
                    tracing::warn!(error = %err, "failed to release parent buffer");
                }
            }
        }
    }
}

/// 一组共享视图的引用计数与回收动作。
pub(crate) struct Lifetime {
    count: RefCount,
    deallocation: Mutex<Option<Deallocation>>,
    hint: Mutex<Option<String>>,
}

impl Lifetime {
    pub(crate) fn new(deallocation: Deallocation) -> Arc<Self> {
        Arc::new(Self {
            count: RefCount::new(),
            deallocation: Mutex::new(Some(deallocation)),
            hint: Mutex::new(None),
        })
    }

    pub(crate) fn ref_cnt(&self) -> i32 {
        self.count.get()
    }

    pub(crate) fn ensure_accessible(&self) -> Result<()> {
        self.count.ensure_accessible()
    }

    pub(crate) fn retain_n(&self, increment: i32) -> Result<()> {
        self.count.retain(increment)
    }

    pub(crate) fn release_n(&self, decrement: i32) -> Result<bool> {
        let dead = self.count.release(decrement)?;
        if dead {
            self.deallocate();
        }
        Ok(dead)
    }

    pub(crate) fn touch(&self, hint: &str) {
        *self.hint.lock() = Some(hint.to_owned());
    }

    fn deallocate(&self) {
        let deallocation = self.deallocation.lock().take();
        if let Some(deallocation) = deallocation {
            deallocation.run();
        }
    }
}

impl Drop for Lifetime {
    fn drop(&mut self) {
        let ref_cnt = self.count.get();
        if ref_cnt > 0 {
            let hint = self.hint.lock().take();
            tracing::warn!(
                ref_cnt,
                hint = hint.as_deref().unwrap_or("<none>"),
                "buffer leak detected: last handle dropped before release"
            );
            self.deallocate();
        }
    }
}
