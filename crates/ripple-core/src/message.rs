use std::{any::Any, fmt};

use crate::{error::Result, refcnt::ReferenceCounted};

type ErasedRelease = fn(&(dyn Any + Send)) -> Result<bool>;

/// Pipeline 中流动的类型擦除消息。
///
/// # 教案式说明
/// - **意图（Why）**：Handler 链上的消息类型随阶段变化（字节缓冲 → 帧 → 业务对象），
///   Pipeline 本身不能对具体类型做假设，因此以 `Box<dyn Any + Send>` 承载。
/// - **逻辑（How）**：通过 [`reference_counted`](Self::reference_counted) 构造的消息会记住一个擦除后的
///   释放函数；尾部哨兵或编解码适配器在丢弃消息时调用 [`release`](Self::release)，
///   从而不需要知道具体类型也能归还池化内存。
/// - **契约（What）**：普通消息的 `release` 仅丢弃并返回 `Ok(false)`；引用计数消息在释放后被丢弃，
///   返回值与底层 `release()` 一致。
pub struct PipelineMessage {
    payload: Box<dyn Any + Send>,
    release: Option<ErasedRelease>,
    type_name: &'static str,
}

impl PipelineMessage {
    /// 包装普通消息。
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            payload: Box::new(value),
            release: None,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// 包装引用计数消息，丢弃路径会调用其 `release()`。
    pub fn reference_counted<T: ReferenceCounted + Any + Send>(value: T) -> Self {
        Self {
            payload: Box::new(value),
            release: Some(release_erased::<T>),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// 判断负载是否为 `T`。
    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }

    /// 借用负载。
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// 取出负载；类型不符时原样返回消息。
    pub fn downcast<T: Any>(self) -> core::result::Result<T, Self> {
        let Self {
            payload,
            release,
            type_name,
        } = self;
        match payload.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(payload) => Err(Self {
                payload,
                release,
                type_name,
            }),
        }
    }

    /// 负载的类型名，仅用于日志。
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 负载是否携带引用计数。
    pub fn is_reference_counted(&self) -> bool {
        self.release.is_some()
    }

    /// 丢弃消息；引用计数消息会先释放一次。
    pub fn release(self) -> Result<bool> {
        match self.release {
            Some(release) => release(self.payload.as_ref()),
            None => Ok(false),
        }
    }
}

impl fmt::Debug for PipelineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineMessage")
            .field("type", &self.type_name)
            .field("reference_counted", &self.release.is_some())
            .finish()
    }
}

fn release_erased<T: ReferenceCounted + Any>(payload: &(dyn Any + Send)) -> Result<bool> {
    match payload.downcast_ref::<T>() {
        Some(value) => value.release(),
        None => Ok(false),
    }
}
