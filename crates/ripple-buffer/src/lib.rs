#![deny(unsafe_code)]

//! `ripple-buffer` 提供引用计数的字节缓冲与按尺寸级别复用存储的池化分配器。
//!
//! # 模块定位（Why）
//! - 编解码器需要可零拷贝切分、可显式保留与释放的缓冲，并希望频繁的同尺寸分配命中缓存；
//! - 引用计数契约来自 `ripple-core`，本 crate 落地缓冲、分配器、组合缓冲与持有者。
//!
//! # 设计概要（How）
//! - `buf` 模块实现 [`ByteBuf`]：游标、切片、复制视图与深拷贝；
//! - `lifetime` 模块把存储与计数拆成共享对象，并通过 `BufferRecycler` 把回收交还给池；
//! - `pool` 模块实现 Arena 分片、无锁自由链表的 [`PooledByteBufAllocator`] 与非池化分配；
//! - `composite` 与 `holder` 模块分别提供组合缓冲与缓冲持有者；
//! - `config` 模块承载可从 TOML 加载的 [`PoolConfig`]。
//!
//! ```rust
//! use ripple_buffer::{ByteBufAllocator, PooledByteBufAllocator};
//! use ripple_core::ReferenceCounted;
//!
//! let pool = PooledByteBufAllocator::new();
//! let mut buf = pool.buffer(16, 1024).unwrap();
//! buf.write_bytes(b"ripple").unwrap();
//! let slice = buf.slice(0, 3).unwrap();
//! assert_eq!(slice.to_vec().unwrap(), b"rip");
//! assert!(!buf.release().unwrap());
//! assert!(slice.release().unwrap());
//! assert_eq!(pool.stats().deallocations, 1);
//! ```

mod buf;
mod composite;
mod config;
mod holder;
mod lifetime;
mod pool;

pub use buf::ByteBuf;
pub use composite::CompositeByteBuf;
pub use config::{ConfigError, DEFAULT_MAX_CAPACITY, PoolConfig};
pub use holder::{ByteBufHolder, DefaultByteBufHolder, ErasedHolder, checked_content, holder_eq};
pub use pool::{
    ByteBufAllocator, PoolStats, PooledByteBufAllocator, Unpooled, UnpooledByteBufAllocator,
};
