use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use flate2::{Compress, Compression, FlushCompress};
use ripple_buffer::{ByteBufAllocator, ByteBufHolder};
use ripple_core::{
    CoreError, PipelineMessage, ReferenceCounted, Result, codec::MessageEncoder, error::codes,
    pipeline::Context,
};
use spin::Mutex;

use super::{EMPTY_DEFLATE_BLOCK, FRAME_TAIL, OUTPUT_CHUNK, default_allocator};
use crate::{
    extension::{NeverSkip, WebSocketExtensionFilter},
    frame::{FrameKind, WebSocketFrame, rsv},
};

/// `permessage-deflate` 出站压缩器。
///
/// # 教案式说明
/// - **意图（Why）**：与解压侧对称，压缩状态跨分片保留，消息结束时按协商结果决定是否重置。
/// - **逻辑（How）**：
///   1. 接受不带 `RSV1` 的文本/二进制帧，以及压缩消息进行中的延续帧；
///   2. 以同步刷新压缩负载，最后一个分片去掉 `00 00 FF FF` 尾部；
///   3. 空负载的最后一个分片直接写出 `00` 空块，空负载的中间分片返回 `codec.compression`；
///   4. 文本/二进制帧置 `RSV1`，延续帧保留原保留位。
/// - **契约（What）**：`no_context` 为真时，每条消息的最后一个分片之后重置压缩器。
pub struct PerMessageDeflateEncoder {
    level: u32,
    no_context: bool,
    compressing: AtomicBool,
    deflater: Mutex<Compress>,
    filter: Arc<dyn WebSocketExtensionFilter>,
    alloc: Arc<dyn ByteBufAllocator>,
}

impl PerMessageDeflateEncoder {
    pub fn new(level: u32, no_context: bool) -> Self {
        Self {
            level,
            no_context,
            compressing: AtomicBool::new(false),
            deflater: Mutex::new(Compress::new(Compression::new(level), false)),
            filter: Arc::new(NeverSkip),
            alloc: default_allocator(),
        }
    }

    /// 设置跳过压缩的帧过滤器。
    pub fn with_filter(mut self, filter: Arc<dyn WebSocketExtensionFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// 设置输出缓冲的分配器。
    pub fn with_allocator(mut self, alloc: Arc<dyn ByteBufAllocator>) -> Self {
        self.alloc = alloc;
        self
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn no_context(&self) -> bool {
        self.no_context
    }

    /// 是否处于一条压缩消息的中途。
    pub fn is_compressing(&self) -> bool {
        self.compressing.load(Ordering::Acquire)
    }

    fn compress(&self, input: &[u8], final_fragment: bool) -> Result<Vec<u8>> {
        let mut deflater = self.deflater.lock();
        let mut output = Vec::with_capacity(input.len() + 64);
        let mut consumed = 0;
        loop {
            if output.capacity() - output.len() < 64 {
                output.reserve(OUTPUT_CHUNK);
            }
            let before_in = deflater.total_in();
            let before_len = output.len();
            deflater
                .compress_vec(&input[consumed..], &mut output, FlushCompress::Sync)
                .map_err(|err| {
                    CoreError::new(codes::CODEC_COMPRESSION, format!("deflate failed: {err}"))
                        .with_cause(err)
                })?;
            consumed += (deflater.total_in() - before_in) as usize;
            let flushed = consumed == input.len() && output.len() < output.capacity();
            let stalled = deflater.total_in() == before_in && output.len() == before_len;
            if flushed || stalled {
                break;
            }
        }
        if final_fragment && output.ends_with(&FRAME_TAIL) {
            output.truncate(output.len() - FRAME_TAIL.len());
        }
        Ok(output)
    }
}

impl MessageEncoder for PerMessageDeflateEncoder {
    type Input = WebSocketFrame;

    fn encode(
        &self,
        _ctx: &dyn Context,
        frame: &WebSocketFrame,
        out: &mut Vec<PipelineMessage>,
    ) -> Result<()> {
        let payload = frame.content()?.to_vec()?;
        let final_fragment = frame.is_final_fragment();
        let compressed = if !payload.is_empty() {
            let compressed = self.compress(&payload, final_fragment)?;
            if compressed.is_empty() {
                return Err(CoreError::new(
                    codes::CODEC_COMPRESSION,
                    "cannot read compressed buffer",
                ));
            }
            compressed
        } else if final_fragment {
            EMPTY_DEFLATE_BLOCK.to_vec()
        } else {
            return Err(CoreError::new(
                codes::CODEC_COMPRESSION,
                "cannot compress empty non-final fragment",
            ));
        };

        if final_fragment && self.no_context {
            self.deflater.lock().reset();
        }

        let mut content = self.alloc.buffer_with_capacity(compressed.len())?;
        if let Err(err) = content.write_bytes(&compressed) {
            let _ = content.release();
            return Err(err);
        }
        let new_rsv = if frame.kind().is_data() {
            frame.rsv() | rsv::RSV1
        } else {
            frame.rsv()
        };
        out.push(frame.with_rsv(new_rsv, content).into_message());

        if final_fragment {
            self.compressing.store(false, Ordering::Release);
        } else if frame.kind().is_data() {
            self.compressing.store(true, Ordering::Release);
        }
        Ok(())
    }

    fn accepts(&self, msg: &PipelineMessage) -> bool {
        let Some(frame) = msg.downcast_ref::<WebSocketFrame>() else {
            return false;
        };
        let candidate = match frame.kind() {
            FrameKind::Text | FrameKind::Binary => frame.rsv() & rsv::RSV1 == 0,
            FrameKind::Continuation => self.is_compressing(),
            _ => false,
        };
        candidate && !self.filter.must_skip(frame)
    }

    fn name(&self) -> &'static str {
        "PerMessageDeflateEncoder"
    }
}
