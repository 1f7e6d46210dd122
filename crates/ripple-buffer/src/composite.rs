use std::fmt;

use ripple_core::{RefCount, ReferenceCounted, Result};

use crate::{buf::ByteBuf, pool::ByteBufAllocator};

/// 由多个组件缓冲拼接而成的逻辑缓冲。
///
/// # 教案式说明
/// - **意图（Why）**：解压等场景会分批产出若干缓冲，先收集再按需合并可以避免每批都复制。
/// - **逻辑（How）**：组件按加入顺序保存；无可读字节的组件在加入时直接释放；
///   组合缓冲自身计数归零时逐个释放组件。
/// - **契约（What）**：组合缓冲取得每个加入组件的一次计数；`consolidate` 不改变组件，
///   返回的新缓冲由调用方负责释放。
#[derive(Default)]
pub struct CompositeByteBuf {
    components: Vec<ByteBuf>,
    count: RefCount,
}

impl CompositeByteBuf {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加组件；组件没有可读字节时立即释放它。
    pub fn add_component(&mut self, component: ByteBuf) -> Result<()> {
        self.count.ensure_accessible()?;
        if component.is_readable() {
            self.components.push(component);
        } else {
            component.release()?;
        }
        Ok(())
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// 所有组件可读字节之和。
    pub fn readable_bytes(&self) -> usize {
        self.components.iter().map(ByteBuf::readable_bytes).sum()
    }

    pub fn components(&self) -> &[ByteBuf] {
        &self.components
    }

    /// 按顺序复制所有组件的可读字节。
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        self.count.ensure_accessible()?;
        let mut out = Vec::with_capacity(self.readable_bytes());
        for component in &self.components {
            component.with_readable(|bytes| out.extend_from_slice(bytes))?;
        }
        Ok(out)
    }

    /// 把全部可读字节合并到 `alloc` 分配的新缓冲。
    pub fn consolidate(&self, alloc: &dyn ByteBufAllocator) -> Result<ByteBuf> {
        let data = self.to_vec()?;
        let mut merged = alloc.buffer_with_capacity(data.len())?;
        if let Err(err) = merged.write_bytes(&data) {
            let _ = merged.release();
            return Err(err);
        }
        Ok(merged)
    }
}

impl ReferenceCounted for CompositeByteBuf {
    fn ref_cnt(&self) -> i32 {
        self.count.get()
    }

    fn retain_n(&self, increment: i32) -> Result<()> {
        self.count.retain(increment)
    }

    /// 归零时逐个释放组件；组件句柄在组合缓冲丢弃时一并丢弃。
    ///
    /// 某个组件释放失败不会中断其余组件的释放，返回遇到的第一个错误。
    fn release_n(&self, decrement: i32) -> Result<bool> {
        let dead = self.count.release(decrement)?;
        if dead {
            let first_err = self
                .components
                .iter()
                .filter_map(|component| component.release().err())
                .fold(None, |first, err| first.or(Some(err)));
            if let Some(err) = first_err {
                return Err(err);
            }
        }
        Ok(dead)
    }
}

impl fmt::Debug for CompositeByteBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeByteBuf")
            .field("components", &self.components.len())
            .field("readable_bytes", &self.readable_bytes())
            .field("ref_cnt", &self.count.get())
            .finish()
    }
}
