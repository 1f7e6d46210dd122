use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use bytes::BytesMut;
use crossbeam::{queue::ArrayQueue, utils::CachePadded};
use ripple_core::{CoreError, Result, error::codes};

use crate::{
    buf::ByteBuf,
    composite::CompositeByteBuf,
    config::{ConfigError, DEFAULT_MAX_CAPACITY, PoolConfig},
    lifetime::{BufferRecycler, Chunk, Deallocation, Lifetime, ReclaimedChunk},
};

/// 缓冲分配器。
///
/// # 契约说明（What）
/// - `buffer(initial, max)` 返回计数为 1、读写索引为 0、容量为 `initial` 的根缓冲；
/// - `initial > max` 时返回 `buffer.invalid_argument`；
/// - 分配器可被多个线程共享。
pub trait ByteBufAllocator: Send + Sync + 'static {
    /// 分配缓冲。
    fn buffer(&self, initial_capacity: usize, max_capacity: usize) -> Result<ByteBuf>;

    /// 以默认最大容量分配缓冲。
    fn buffer_with_capacity(&self, initial_capacity: usize) -> Result<ByteBuf> {
        self.buffer(initial_capacity, DEFAULT_MAX_CAPACITY)
    }

    /// 分配空的组合缓冲。
    fn composite_buffer(&self) -> CompositeByteBuf {
        CompositeByteBuf::new()
    }

    /// 是否池化。
    fn is_pooled(&self) -> bool;
}

/// 池化分配器的统计快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// 分配次数。
    pub allocations: u64,
    /// 命中自由链表的次数。
    pub pooled_hits: u64,
    /// 超过最大尺寸级别、绕过池的分配次数。
    pub huge_allocations: u64,
    /// 计数归零后回收的次数。
    pub deallocations: u64,
    /// 自由链表已满而被丢弃的存储块数。
    pub dropped_on_full: u64,
    /// 当前存活的根缓冲数量。
    pub active_buffers: u64,
}

/// 按尺寸级别复用存储的分配器。
///
/// # 教案式说明
/// - **意图（Why）**：高吞吐 I/O 会以相近的尺寸反复申请缓冲，按尺寸级别复用存储可以摊薄系统分配成本；
///   多线程争用同一把锁会抵消收益，因此自由链表按 Arena 切分并保持无锁。
/// - **逻辑（How）**：
///   1. 尺寸级别为 `[min_size_class, max_size_class]` 内的 2 的幂，请求落到不小于它的最小级别；
///   2. 每个线程首次分配时按轮转方式绑定一个 Arena，每个 Arena 的每个级别是一条有界的
///      `crossbeam::queue::ArrayQueue`；
///   3. 缓冲计数归零时，存储回到它出生的 Arena；链表已满则丢弃并计入统计；
///   4. 超过最大级别的请求直接按需分配，释放时不入池。
/// - **契约（What）**：
///   - 返回缓冲的 `capacity()` 等于请求容量，底层存储可能更大，增长时优先使用这部分余量；
///   - 复用的存储不清零，调用方只能读取自己写入的区域。
/// - **风险（Trade-offs）**：线程与 Arena 的绑定是全局轮转的，线程数远多于 Arena 时多个线程共享同一
///   Arena，但仍然只在无锁队列上竞争。
#[derive(Clone)]
pub struct PooledByteBufAllocator {
    inner: Arc<PoolInner>,
}

impl Default for PooledByteBufAllocator {
    fn default() -> Self {
        Self::from_validated(PoolConfig::default())
    }
}

impl PooledByteBufAllocator {
    /// 以默认配置创建。
    pub fn new() -> Self {
        Self::default()
    }

    /// 以给定配置创建。
    pub fn with_config(config: PoolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    /// 进程级共享实例。
    pub fn shared() -> &'static PooledByteBufAllocator {
        static SHARED: OnceLock<PooledByteBufAllocator> = OnceLock::new();
        SHARED.get_or_init(PooledByteBufAllocator::new)
    }

    fn from_validated(config: PoolConfig) -> Self {
        let arenas = (0..config.resolved_arenas())
            .map(|_| Arena::new(config.size_class_count(), config.free_list_depth))
            .collect();
        Self {
            inner: Arc::new(PoolInner {
                config,
                arenas,
                metrics: PoolMetrics::default(),
            }),
        }
    }

    /// 生效的配置。
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Arena 数量。
    pub fn arena_count(&self) -> usize {
        self.inner.arenas.len()
    }

    /// 统计快照。
    pub fn stats(&self) -> PoolStats {
        self.inner.metrics.snapshot()
    }

    /// 自由链表中缓存的存储块总数。
    pub fn cached_chunks(&self) -> usize {
        self.inner
            .arenas
            .iter()
            .flat_map(|arena| arena.classes.iter())
            .map(ArrayQueue::len)
            .sum()
    }

    /// 清空全部自由链表，返回释放的字节数。
    pub fn trim(&self) -> usize {
        let mut reclaimed = 0;
        for queue in self.inner.arenas.iter().flat_map(|arena| arena.classes.iter()) {
            while let Some(storage) = queue.pop() {
                reclaimed += storage.len();
            }
        }
        tracing::debug!(bytes = reclaimed, "pool trimmed");
        reclaimed
    }

    /// `capacity` 所属的尺寸级别（字节），超出最大级别时为 `None`。
    pub fn size_class_of(&self, capacity: usize) -> Option<usize> {
        self.inner.size_class(capacity).map(|(_, size)| size)
    }
}

impl ByteBufAllocator for PooledByteBufAllocator {
    fn buffer(&self, initial_capacity: usize, max_capacity: usize) -> Result<ByteBuf> {
        validate_capacity(initial_capacity, max_capacity)?;
        let inner = &self.inner;
        inner.metrics.allocations.fetch_add(1, Ordering::Relaxed);
        let arena = inner.arena_index();
        let storage = match inner.size_class(initial_capacity) {
            Some((index, size)) => match inner.arenas[arena].classes[index].pop() {
                Some(storage) => {
                    inner.metrics.pooled_hits.fetch_add(1, Ordering::Relaxed);
                    storage
                }
                None => BytesMut::zeroed(size),
            },
            None => {
                inner.metrics.huge_allocations.fetch_add(1, Ordering::Relaxed);
                BytesMut::zeroed(initial_capacity)
            }
        };
        inner.metrics.active_buffers.fetch_add(1, Ordering::Relaxed);
        let chunk = Chunk::new(storage);
        let recycler: Arc<dyn BufferRecycler> = Arc::clone(inner) as Arc<dyn BufferRecycler>;
        let lifetime = Lifetime::new(Deallocation::Storage {
            chunk: Arc::clone(&chunk),
            recycler: Some((recycler, arena)),
        });
        Ok(ByteBuf::new_root(
            chunk,
            lifetime,
            Origin::Pooled(self.clone()),
            initial_capacity,
            max_capacity,
        ))
    }

    fn buffer_with_capacity(&self, initial_capacity: usize) -> Result<ByteBuf> {
        self.buffer(initial_capacity, self.inner.config.default_max_capacity)
    }

    fn is_pooled(&self) -> bool {
        true
    }
}

struct Arena {
    classes: Vec<ArrayQueue<BytesMut>>,
}

impl Arena {
    fn new(class_count: usize, depth: usize) -> Self {
        Self {
            classes: (0..class_count).map(|_| ArrayQueue::new(depth)).collect(),
        }
    }
}

static NEXT_THREAD_SLOT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static THREAD_SLOT: usize = NEXT_THREAD_SLOT.fetch_add(1, Ordering::Relaxed);
}

struct PoolInner {
    config: PoolConfig,
    arenas: Vec<Arena>,
    metrics: PoolMetrics,
}

impl PoolInner {
    fn size_class(&self, capacity: usize) -> Option<(usize, usize)> {
        if capacity > self.config.max_size_class {
            return None;
        }
        let size = capacity.max(self.config.min_size_class).next_power_of_two();
        let index = (size.trailing_zeros() - self.config.min_size_class.trailing_zeros()) as usize;
        Some((index, size))
    }

    fn arena_index(&self) -> usize {
        THREAD_SLOT.with(|slot| *slot) % self.arenas.len()
    }
}

impl BufferRecycler for PoolInner {
    fn reclaim(&self, reclaimed: ReclaimedChunk) {
        self.metrics.deallocations.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .metrics
            .active_buffers
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |prev| {
                Some(prev.saturating_sub(1))
            });
        let len = reclaimed.storage.len();
        if !len.is_power_of_two() {
            return;
        }
        let Some((index, size)) = self.size_class(len) else {
            return;
        };
        if size != len {
            return;
        }
        let arena = &self.arenas[reclaimed.arena % self.arenas.len()];
        if arena.classes[index].push(reclaimed.storage).is_err() {
            self.metrics.dropped_on_full.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(size_class = size, "free list full; chunk dropped");
        }
    }
}

#[derive(Default)]
struct PoolMetrics {
    allocations: CachePadded<AtomicU64>,
    pooled_hits: CachePadded<AtomicU64>,
    huge_allocations: CachePadded<AtomicU64>,
    deallocations: CachePadded<AtomicU64>,
    dropped_on_full: CachePadded<AtomicU64>,
    active_buffers: CachePadded<AtomicU64>,
}

impl PoolMetrics {
    fn snapshot(&self) -> PoolStats {
        PoolStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            pooled_hits: self.pooled_hits.load(Ordering::Relaxed),
            huge_allocations: self.huge_allocations.load(Ordering::Relaxed),
            deallocations: self.deallocations.load(Ordering::Relaxed),
            dropped_on_full: self.dropped_on_full.load(Ordering::Relaxed),
            active_buffers: self.active_buffers.load(Ordering::Relaxed),
        }
    }
}

/// 直接按需分配、释放即归还系统的分配器。
#[derive(Clone, Copy, Debug, Default)]
pub struct UnpooledByteBufAllocator;

impl ByteBufAllocator for UnpooledByteBufAllocator {
    fn buffer(&self, initial_capacity: usize, max_capacity: usize) -> Result<ByteBuf> {
        validate_capacity(initial_capacity, max_capacity)?;
        Ok(unpooled_root(
            BytesMut::zeroed(initial_capacity),
            initial_capacity,
            max_capacity,
        ))
    }

    fn is_pooled(&self) -> bool {
        false
    }
}

/// 非池化缓冲的便捷构造。
pub struct Unpooled;

impl Unpooled {
    /// 空缓冲。
    pub fn empty() -> ByteBuf {
        unpooled_root(BytesMut::new(), 0, DEFAULT_MAX_CAPACITY)
    }

    /// 可增长的空缓冲。
    pub fn buffer(initial_capacity: usize) -> ByteBuf {
        unpooled_root(
            BytesMut::zeroed(initial_capacity),
            initial_capacity,
            DEFAULT_MAX_CAPACITY.max(initial_capacity),
        )
    }

    /// 复制 `data` 到新缓冲，写索引位于末尾。
    pub fn copied(data: &[u8]) -> ByteBuf {
        let len = data.len();
        let mut buf = unpooled_root(BytesMut::from(data), len, DEFAULT_MAX_CAPACITY.max(len));
        buf.advance_writer_unchecked(len);
        buf
    }
}

fn unpooled_root(storage: BytesMut, capacity: usize, max_capacity: usize) -> ByteBuf {
    let chunk = Chunk::new(storage);
    let lifetime = Lifetime::new(Deallocation::Storage {
        chunk: Arc::clone(&chunk),
        recycler: None,
    });
    ByteBuf::new_root(chunk, lifetime, Origin::Unpooled, capacity, max_capacity)
}

fn validate_capacity(initial_capacity: usize, max_capacity: usize) -> Result<()> {
    if initial_capacity > max_capacity {
        return Err(CoreError::new(
            codes::BUFFER_INVALID_ARGUMENT,
            format!("initial_capacity: {initial_capacity} (expected: not greater than max_capacity({max_capacity}))"),
        ));
    }
    Ok(())
}

/// 缓冲的来源分配器，`copy` 沿用它。
#[derive(Clone)]
pub(crate) enum Origin {
    Pooled(PooledByteBufAllocator),
    Unpooled,
}

impl Origin {
    pub(crate) fn allocate(&self, capacity: usize, max_capacity: usize) -> Result<ByteBuf> {
        match self {
            Origin::Pooled(pool) => pool.buffer(capacity, max_capacity),
            Origin::Unpooled => UnpooledByteBufAllocator.buffer(capacity, max_capacity),
        }
    }

    pub(crate) fn is_pooled(&self) -> bool {
        matches!(self, Origin::Pooled(_))
    }
}
