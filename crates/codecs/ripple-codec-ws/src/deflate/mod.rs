//! `permessage-deflate` 的压缩与解压节点。
//!
//! 压缩数据使用无 zlib 头的原始 deflate 流。每条消息以同步刷新结束，
//! 同步刷新产生的 `00 00 FF FF` 尾部在线上省略，解压时补回。

mod decoder;
mod encoder;
mod inflater;

use std::sync::Arc;

use ripple_buffer::{ByteBufAllocator, PooledByteBufAllocator};

pub use decoder::PerMessageDeflateDecoder;
pub use encoder::PerMessageDeflateEncoder;
pub use inflater::RawInflater;

/// 同步刷新在流末尾留下的空存储块。
pub const FRAME_TAIL: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// 空消息在线上的表示。
pub const EMPTY_DEFLATE_BLOCK: [u8; 1] = [0x00];

const OUTPUT_CHUNK: usize = 8 * 1024;

fn default_allocator() -> Arc<dyn ByteBufAllocator> {
    Arc::new(PooledByteBufAllocator::shared().clone())
}
