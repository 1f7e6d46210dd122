//! 缓冲持有者。
//!
//! # 设计背景（Why）
//! - 协议帧、报文体等消息都“包着一个缓冲再加几个字段”；它们的复制、复制视图与计数操作
//!   都应转交给内部缓冲，只在最后一步用 `replace` 构造同一具体类型的新实例。
//!
//! # 契约说明（What）
//! - 相等性只在同一具体类型之间成立：经由 [`holder_eq`] 比较不同类型的持有者恒为 `false`，
//!   即便二者内容逐字节相同；
//! - 计数操作直接转交内部缓冲，返回值与缓冲一致。

use std::{
    any::Any,
    fmt,
    hash::{Hash, Hasher},
};

use ripple_core::{ReferenceCounted, Result};

use crate::buf::ByteBuf;

/// 持有恰好一个 [`ByteBuf`] 的消息。
///
/// # 教案式说明
/// - **意图（Why）**：让各种消息复用同一套复制语义，而不必各自实现。
/// - **逻辑（How）**：`copy`/`duplicate`/`retained_duplicate` 先对内容调用同名操作，再交给 `replace`。
/// - **契约（What）**：
///   - `content` 在计数归零后返回 `buffer.illegal_reference_count`；
///   - `replace` 必须返回同一具体类型，并保留除内容之外的全部字段。
pub trait ByteBufHolder: ReferenceCounted + Sized {
    /// 被持有的缓冲。
    fn content(&self) -> Result<&ByteBuf>;

    /// 以 `content` 替换内容，构造同一具体类型的新持有者。
    fn replace(&self, content: ByteBuf) -> Self;

    /// 内容深拷贝。
    fn copy(&self) -> Result<Self> {
        let content = self.content()?.copy()?;
        Ok(self.replace(content))
    }

    /// 共享内容计数的复制视图。
    fn duplicate(&self) -> Result<Self> {
        let content = self.content()?.duplicate()?;
        Ok(self.replace(content))
    }

    /// 持有内容一次计数的复制视图。
    fn retained_duplicate(&self) -> Result<Self> {
        let content = self.content()?.retained_duplicate()?;
        Ok(self.replace(content))
    }
}

/// 基础持有者，除内容外不携带其他字段。
pub struct DefaultByteBufHolder {
    data: ByteBuf,
}

impl DefaultByteBufHolder {
    pub fn new(data: ByteBuf) -> Self {
        Self { data }
    }

    /// 取出内部缓冲，计数不变。
    pub fn into_content(self) -> ByteBuf {
        self.data
    }
}

impl ReferenceCounted for DefaultByteBufHolder {
    fn ref_cnt(&self) -> i32 {
        self.data.ref_cnt()
    }

    fn retain_n(&self, increment: i32) -> Result<()> {
        self.data.retain_n(increment)
    }

    fn release_n(&self, decrement: i32) -> Result<bool> {
        self.data.release_n(decrement)
    }

    fn touch_hint(&self, hint: &str) {
        self.data.touch_hint(hint);
    }
}

impl ByteBufHolder for DefaultByteBufHolder {
    fn content(&self) -> Result<&ByteBuf> {
        checked_content(&self.data)
    }

    fn replace(&self, content: ByteBuf) -> Self {
        Self::new(content)
    }
}

impl PartialEq for DefaultByteBufHolder {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for DefaultByteBufHolder {}

impl Hash for DefaultByteBufHolder {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data.hash(state);
    }
}

impl fmt::Debug for DefaultByteBufHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DefaultByteBufHolder({:?})", self.data)
    }
}

/// 供持有者实现 `content` 时复用的计数检查。
pub fn checked_content(data: &ByteBuf) -> Result<&ByteBuf> {
    data.ensure_live()?;
    Ok(data)
}

/// 擦除具体类型后仍可比较的持有者。
///
/// 任何 `ByteBufHolder + PartialEq` 类型自动实现本 trait。
pub trait ErasedHolder: Any {
    fn as_any(&self) -> &dyn Any;

    /// 仅当 `other` 与自身是同一具体类型且相等时为 `true`。
    fn dyn_eq(&self, other: &dyn ErasedHolder) -> bool;
}

impl<T> ErasedHolder for T
where
    T: ByteBufHolder + PartialEq + Any,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn ErasedHolder) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

/// 比较两个类型擦除的持有者。
///
/// ```rust
/// use ripple_buffer::{DefaultByteBufHolder, Unpooled, holder_eq};
///
/// let a = DefaultByteBufHolder::new(Unpooled::copied(b"x"));
/// let b = DefaultByteBufHolder::new(Unpooled::copied(b"x"));
/// assert!(holder_eq(&a, &b));
/// # use ripple_core::ReferenceCounted;
/// # a.release().unwrap();
/// # b.release().unwrap();
/// ```
pub fn holder_eq(lhs: &dyn ErasedHolder, rhs: &dyn ErasedHolder) -> bool {
    lhs.dyn_eq(rhs)
}
