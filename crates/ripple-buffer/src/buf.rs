//! 引用计数的字节缓冲。
//!
//! # 设计背景（Why）
//! - 协议编解码需要在同一块存储上切出多个视图（切片、复制视图），并在最后一个使用者释放后
//!   把存储还给池；`ByteBuf` 把“视图位置”（偏移、读写索引、容量）留在句柄上，
//!   把“存储”与“计数”放到共享对象中。
//!
//! # 逻辑解析（How）
//! - 根缓冲持有存储所有权的计数记录，可以增长到 `max_capacity`；
//! - `duplicate` 与源共享同一计数记录，`slice`/`retained_duplicate` 拥有派生计数，
//!   派生计数归零时释放父记录一次；
//! - 所有访问先检查计数，计数为 0 后返回 `buffer.illegal_reference_count`。
//!
//! # 契约说明（What）
//! - `0 <= reader_index <= writer_index <= capacity <= max_capacity` 始终成立；
//! - 越界访问返回 `buffer.index_out_of_bounds`，索引保持不变；
//! - 多字节整数按大端序读写。

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use ripple_core::{CoreError, PipelineMessage, ReferenceCounted, Result, error::codes};

use crate::{
    lifetime::{Chunk, Deallocation, Lifetime},
    pool::Origin,
};

const DEGRADED_HASH: u64 = 0x5bd1_e995;
const MIN_GROWTH: usize = 64;

/// 引用计数的字节缓冲句柄。
///
/// # 教案式说明
/// - **意图（Why）**：为编解码器提供带独立读写游标、可零拷贝切分的字节容器。
/// - **逻辑（How）**：读写都换算为 `offset + index` 后访问共享存储；写入不足时只有根缓冲可以增长，
///   增长目标为满足需求的下一个 2 的幂（至少 64 字节），并以 `max_capacity` 封顶。
/// - **契约（What）**：
///   - 句柄本身是 `Send + Sync` 的，但游标只能通过 `&mut self` 推进；
///   - 丢弃句柄不会减少计数；计数仍为正时丢弃最后一个句柄会记录泄漏告警并回收存储。
/// - **风险（Trade-offs）**：视图与源共享存储，经由任意一方的写入对另一方可见。
pub struct ByteBuf {
    chunk: Arc<Chunk>,
    lifetime: Arc<Lifetime>,
    origin: Origin,
    offset: usize,
    reader_index: usize,
    writer_index: usize,
    capacity: usize,
    max_capacity: usize,
    growable: bool,
}

impl ByteBuf {
    pub(crate) fn new_root(
        chunk: Arc<Chunk>,
        lifetime: Arc<Lifetime>,
        origin: Origin,
        capacity: usize,
        max_capacity: usize,
    ) -> Self {
        Self {
            chunk,
            lifetime,
            origin,
            offset: 0,
            reader_index: 0,
            writer_index: 0,
            capacity,
            max_capacity,
            growable: true,
        }
    }

    fn derived(
        &self,
        lifetime: Arc<Lifetime>,
        offset: usize,
        capacity: usize,
        reader_index: usize,
        writer_index: usize,
    ) -> Self {
        Self {
            chunk: Arc::clone(&self.chunk),
            lifetime,
            origin: self.origin.clone(),
            offset,
            reader_index,
            writer_index,
            capacity,
            max_capacity: capacity,
            growable: false,
        }
    }

    pub(crate) fn advance_writer_unchecked(&mut self, len: usize) {
        self.writer_index += len;
    }

    /// 包装为管道消息。
    pub fn into_message(self) -> PipelineMessage {
        PipelineMessage::reference_counted(self)
    }

    /// 当前容量。
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 最大容量；视图的最大容量等于其容量。
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// 是否来自池化分配器。
    pub fn is_pooled(&self) -> bool {
        self.origin.is_pooled()
    }

    /// 计数是否已归零。
    pub fn is_released(&self) -> bool {
        self.lifetime.ref_cnt() == 0
    }

    /// 计数为正时返回 `Ok`，否则返回 `buffer.illegal_reference_count`。
    pub fn ensure_live(&self) -> Result<()> {
        self.lifetime.ensure_accessible()
    }

    pub fn reader_index(&self) -> usize {
        self.reader_index
    }

    pub fn writer_index(&self) -> usize {
        self.writer_index
    }

    pub fn readable_bytes(&self) -> usize {
        self.writer_index - self.reader_index
    }

    pub fn writable_bytes(&self) -> usize {
        self.capacity - self.writer_index
    }

    pub fn max_writable_bytes(&self) -> usize {
        self.max_capacity - self.writer_index
    }

    pub fn is_readable(&self) -> bool {
        self.writer_index > self.reader_index
    }

    pub fn is_writable(&self) -> bool {
        self.capacity > self.writer_index
    }

    /// 设置读索引，要求不超过写索引。
    pub fn set_reader_index(&mut self, reader_index: usize) -> Result<()> {
        if reader_index > self.writer_index {
            return Err(out_of_bounds(format!(
                "reader_index: {reader_index} (expected: 0 <= reader_index <= writer_index({}))",
                self.writer_index
            )));
        }
        self.reader_index = reader_index;
        Ok(())
    }

    /// 设置写索引，要求位于读索引与容量之间。
    pub fn set_writer_index(&mut self, writer_index: usize) -> Result<()> {
        if writer_index < self.reader_index || writer_index > self.capacity {
            return Err(out_of_bounds(format!(
                "writer_index: {writer_index} (expected: reader_index({}) <= writer_index <= capacity({}))",
                self.reader_index, self.capacity
            )));
        }
        self.writer_index = writer_index;
        Ok(())
    }

    /// 同时设置读写索引。
    pub fn set_index(&mut self, reader_index: usize, writer_index: usize) -> Result<()> {
        if reader_index > writer_index || writer_index > self.capacity {
            return Err(out_of_bounds(format!(
                "reader_index: {reader_index}, writer_index: {writer_index} (expected: 0 <= reader_index <= writer_index <= capacity({}))",
                self.capacity
            )));
        }
        self.reader_index = reader_index;
        self.writer_index = writer_index;
        Ok(())
    }

    /// 读写索引归零，内容不变。
    pub fn clear(&mut self) {
        self.reader_index = 0;
        self.writer_index = 0;
    }

    /// 保证至少还能写入 `min_writable_bytes` 字节，必要时增长。
    pub fn ensure_writable(&mut self, min_writable_bytes: usize) -> Result<()> {
        self.lifetime.ensure_accessible()?;
        if min_writable_bytes <= self.writable_bytes() {
            return Ok(());
        }
        if !self.growable || min_writable_bytes > self.max_writable_bytes() {
            return Err(out_of_bounds(format!(
                "writer_index({}) + min_writable_bytes({min_writable_bytes}) exceeds max_capacity({})",
                self.writer_index, self.max_capacity
            )));
        }
        let required = self.writer_index + min_writable_bytes;
        let new_capacity = required
            .max(MIN_GROWTH)
            .checked_next_power_of_two()
            .unwrap_or(self.max_capacity)
            .min(self.max_capacity);
        self.chunk.grow(self.offset + new_capacity)?;
        self.capacity = new_capacity;
        Ok(())
    }

    /// 读取绝对位置的字节，不移动索引。
    pub fn get_u8(&self, index: usize) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.get_bytes(index, &mut byte)?;
        Ok(byte[0])
    }

    /// 从绝对位置复制 `dst.len()` 字节，不移动索引。
    pub fn get_bytes(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        self.check_index(index, dst.len())?;
        let start = self.offset + index;
        self.chunk
            .read(start..start + dst.len(), |bytes| dst.copy_from_slice(bytes))
    }

    /// 写入绝对位置的字节，不移动索引。
    pub fn set_u8(&mut self, index: usize, value: u8) -> Result<()> {
        self.set_bytes(index, &[value])
    }

    /// 把 `src` 写到绝对位置，不移动索引。
    pub fn set_bytes(&mut self, index: usize, src: &[u8]) -> Result<()> {
        self.check_index(index, src.len())?;
        let start = self.offset + index;
        self.chunk
            .write(start..start + src.len(), |bytes| bytes.copy_from_slice(src))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut raw = [0u8; 1];
        self.read_bytes_into(&mut raw)?;
        Ok(raw[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut raw = [0u8; 2];
        self.read_bytes_into(&mut raw)?;
        Ok(u16::from_be_bytes(raw))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.read_bytes_into(&mut raw)?;
        Ok(u32::from_be_bytes(raw))
    }

    /// 从读索引复制 `dst.len()` 字节并推进读索引。
    pub fn read_bytes_into(&mut self, dst: &mut [u8]) -> Result<()> {
        self.check_readable(dst.len())?;
        self.get_bytes(self.reader_index, dst)?;
        self.reader_index += dst.len();
        Ok(())
    }

    /// 读出 `length` 字节到新的 `Vec`。
    pub fn read_bytes(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; length];
        self.read_bytes_into(&mut out)?;
        Ok(out)
    }

    /// 跳过 `length` 个可读字节。
    pub fn skip_bytes(&mut self, length: usize) -> Result<()> {
        self.check_readable(length)?;
        self.reader_index += length;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// 在写索引处追加 `src`，必要时增长。
    pub fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        self.ensure_writable(src.len())?;
        self.set_bytes(self.writer_index, src)?;
        self.writer_index += src.len();
        Ok(())
    }

    /// 把 `src` 的全部可读字节追加到本缓冲并推进 `src` 的读索引。
    pub fn write_buf(&mut self, src: &mut ByteBuf) -> Result<()> {
        let data = src.to_vec()?;
        self.write_bytes(&data)?;
        src.reader_index += data.len();
        Ok(())
    }

    /// 以只读切片访问可读区域。
    pub fn with_readable<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        self.lifetime.ensure_accessible()?;
        let start = self.offset + self.reader_index;
        let end = self.offset + self.writer_index;
        self.chunk.read(start..end, f)
    }

    /// 复制可读区域，不移动索引。
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        self.with_readable(<[u8]>::to_vec)
    }

    /// 丢弃已读字节：可读区域移到开头，读索引归零。
    pub fn discard_read_bytes(&mut self) -> Result<()> {
        self.lifetime.ensure_accessible()?;
        if self.reader_index == 0 {
            return Ok(());
        }
        let (reader, writer) = (self.reader_index, self.writer_index);
        self.chunk.write(self.offset..self.offset + writer, |bytes| {
            bytes.copy_within(reader..writer, 0)
        })?;
        self.writer_index -= self.reader_index;
        self.reader_index = 0;
        Ok(())
    }

    /// 共享存储与计数的切片，范围为 `[index, index + length)`。
    ///
    /// 切片持有源的一次计数，释放切片才会归还这次计数。
    pub fn slice(&self, index: usize, length: usize) -> Result<ByteBuf> {
        self.check_index(index, length)?;
        self.lifetime.retain_n(1)?;
        let lifetime = Lifetime::new(Deallocation::Parent(Arc::clone(&self.lifetime)));
        Ok(self.derived(lifetime, self.offset + index, length, 0, length))
    }

    /// 可读区域的切片。
    pub fn readable_slice(&self) -> Result<ByteBuf> {
        self.slice(self.reader_index, self.readable_bytes())
    }

    /// 与 [`ByteBuf::slice`] 相同，保留名称与保留型复制视图对应。
    pub fn retained_slice(&self, index: usize, length: usize) -> Result<ByteBuf> {
        self.slice(index, length)
    }

    /// 从读索引切出 `length` 字节并推进读索引。
    pub fn read_slice(&mut self, length: usize) -> Result<ByteBuf> {
        self.check_readable(length)?;
        let slice = self.slice(self.reader_index, length)?;
        self.reader_index += length;
        Ok(slice)
    }

    /// 共享存储与计数的复制视图，拥有独立游标。
    ///
    /// 复制视图与源共享同一个计数：经由任意一方释放都作用于同一份计数。
    pub fn duplicate(&self) -> Result<ByteBuf> {
        self.lifetime.ensure_accessible()?;
        Ok(self.derived(
            Arc::clone(&self.lifetime),
            self.offset,
            self.capacity,
            self.reader_index,
            self.writer_index,
        ))
    }

    /// 持有源一次计数、拥有独立计数的复制视图。
    pub fn retained_duplicate(&self) -> Result<ByteBuf> {
        self.lifetime.retain_n(1)?;
        let lifetime = Lifetime::new(Deallocation::Parent(Arc::clone(&self.lifetime)));
        Ok(self.derived(
            lifetime,
            self.offset,
            self.capacity,
            self.reader_index,
            self.writer_index,
        ))
    }

    /// 可读区域的深拷贝，存储与计数均独立，来自同一分配器。
    pub fn copy(&self) -> Result<ByteBuf> {
        self.copy_range(self.reader_index, self.readable_bytes())
    }

    /// `[index, index + length)` 的深拷贝。
    pub fn copy_range(&self, index: usize, length: usize) -> Result<ByteBuf> {
        let mut data = vec![0u8; length];
        self.get_bytes(index, &mut data)?;
        let max_capacity = self.max_capacity.max(length);
        let mut copy = self.origin.allocate(length, max_capacity)?;
        copy.write_bytes(&data)?;
        Ok(copy)
    }

    fn check_index(&self, index: usize, length: usize) -> Result<()> {
        self.lifetime.ensure_accessible()?;
        match index.checked_add(length) {
            Some(end) if end <= self.capacity => Ok(()),
            _ => Err(out_of_bounds(format!(
                "index: {index}, length: {length} (expected: range(0, {}))",
                self.capacity
            ))),
        }
    }

    fn check_readable(&self, length: usize) -> Result<()> {
        self.lifetime.ensure_accessible()?;
        if length > self.readable_bytes() {
            return Err(out_of_bounds(format!(
                "reader_index({}) + length({length}) exceeds writer_index({})",
                self.reader_index, self.writer_index
            )));
        }
        Ok(())
    }
}

fn out_of_bounds(message: String) -> CoreError {
    CoreError::new(codes::BUFFER_INDEX_OUT_OF_BOUNDS, message)
}

impl ReferenceCounted for ByteBuf {
    fn ref_cnt(&self) -> i32 {
        self.lifetime.ref_cnt()
    }

    fn retain_n(&self, increment: i32) -> Result<()> {
        self.lifetime.retain_n(increment)
    }

    fn release_n(&self, decrement: i32) -> Result<bool> {
        self.lifetime.release_n(decrement)
    }

    fn touch_hint(&self, hint: &str) {
        self.lifetime.touch(hint);
    }
}

/// 比较双方的可读区域；任一方已释放时不相等。
impl PartialEq for ByteBuf {
    fn eq(&self, other: &Self) -> bool {
        match (self.to_vec(), other.to_vec()) {
            (Ok(lhs), Ok(rhs)) => lhs == rhs,
            _ => false,
        }
    }
}

impl Eq for ByteBuf {}

impl Hash for ByteBuf {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.with_readable(|bytes| bytes.hash(state)) {
            Ok(()) => {}
            Err(_) => DEGRADED_HASH.hash(state),
        }
    }
}

impl fmt::Debug for ByteBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ByteBuf(ridx: {}, widx: {}, cap: {}/{}, refCnt: {})",
            self.reader_index,
            self.writer_index,
            self.capacity,
            self.max_capacity,
            self.ref_cnt()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ByteBufAllocator, PooledByteBufAllocator, Unpooled};
    use tracing_test::traced_test;

    #[test]
    fn root_grows_to_next_power_of_two() {
        let mut buf = Unpooled::buffer(4);
        buf.write_bytes(&[1; 10]).expect("写入触发增长");
        assert_eq!(buf.capacity(), 64);
        buf.write_bytes(&[2; 100]).expect("再次增长");
        assert_eq!(buf.capacity(), 128);
        assert_eq!(buf.readable_bytes(), 110);
    }

    #[test]
    fn growth_stops_at_max_capacity() {
        let mut buf = PooledByteBufAllocator::new()
            .buffer(8, 16)
            .expect("分配");
        buf.write_bytes(&[0; 16]).expect("容量上限内");
        assert_eq!(buf.capacity(), 16);
        let err = buf.write_u8(1).expect_err("超过上限");
        assert_eq!(err.code(), codes::BUFFER_INDEX_OUT_OF_BOUNDS);
        assert_eq!(buf.writer_index(), 16);
    }

    #[test]
    fn slices_cannot_grow() {
        let buf = Unpooled::copied(b"abcdef");
        let mut slice = buf.slice(0, 2).expect("切片");
        slice.clear();
        slice.write_bytes(b"xy").expect("容量内写入");
        assert!(slice.write_u8(b'z').is_err());
        assert_eq!(buf.to_vec().expect("读取"), b"xycdef");
    }

    #[test]
    fn discard_read_bytes_compacts() {
        let mut buf = Unpooled::copied(b"hello");
        buf.skip_bytes(2).expect("跳过");
        buf.discard_read_bytes().expect("压缩");
        assert_eq!(buf.reader_index(), 0);
        assert_eq!(buf.writer_index(), 3);
        assert_eq!(buf.to_vec().expect("读取"), b"llo");
    }

    #[test]
    #[traced_test]
    fn dropping_unreleased_buffer_logs_leak() {
        let buf = Unpooled::copied(b"leak");
        buf.touch_hint("decoder");
        drop(buf);
        assert!(logs_contain("buffer leak detected"));
        assert!(logs_contain("decoder"));
    }

    #[test]
    #[traced_test]
    fn released_buffer_drops_quietly() {
        let buf = Unpooled::copied(b"ok");
        assert!(buf.release().expect("释放"));
        drop(buf);
        assert!(!logs_contain("buffer leak detected"));
    }
}
