use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use ripple_buffer::{ByteBuf, ByteBufAllocator, ByteBufHolder, CompositeByteBuf, Unpooled};
use ripple_core::{
    CoreError, EmbeddedChannel, PipelineMessage, ReferenceCounted, Result,
    codec::{DecoderHandler, MessageDecoder},
    error::codes,
    pipeline::Context,
};
use spin::Mutex;

use super::{EMPTY_DEFLATE_BLOCK, FRAME_TAIL, RawInflater, default_allocator};
use crate::{
    extension::{NeverSkip, WebSocketExtensionFilter},
    frame::{FrameKind, WebSocketFrame, rsv},
};

/// `permessage-deflate` 入站解压器。
///
/// # 教案式说明
/// - **意图（Why）**：一条压缩消息可能被拆成多个分片，解压状态需要跨分片乃至跨消息保留，
///   因此解压在一条内嵌的子管道中进行，子管道的生命周期由本解码器管理。
/// - **逻辑（How）**：
///   1. 接受带 `RSV1` 的文本/二进制帧，以及压缩消息进行中的延续帧；
///   2. 首次解压时创建子管道；若此时遇到的不是文本/二进制帧，返回 `codec.unexpected_message`；
///   3. 写入负载的保留型复制视图，最后一个分片追加 `00 00 FF FF` 尾部；
///   4. 把子管道产出的全部缓冲收集到组合缓冲并合并为新帧的负载；
///   5. 非空、非空块标记的输入没有任何产出时，除延续帧外返回 `codec.decompression`；
///   6. `no_context` 为真时，每条消息的最后一个分片之后销毁子管道。
/// - **契约（What）**：输出帧保持类型与分片标记，保留位清除 `RSV1`。
pub struct PerMessageDeflateDecoder {
    no_context: bool,
    compressing: AtomicBool,
    inflater: Mutex<Option<EmbeddedChannel>>,
    filter: Arc<dyn WebSocketExtensionFilter>,
    alloc: Arc<dyn ByteBufAllocator>,
}

impl PerMessageDeflateDecoder {
    pub fn new(no_context: bool) -> Self {
        Self {
            no_context,
            compressing: AtomicBool::new(false),
            inflater: Mutex::new(None),
            filter: Arc::new(NeverSkip),
            alloc: default_allocator(),
        }
    }

    /// 设置跳过解压的帧过滤器。
    pub fn with_filter(mut self, filter: Arc<dyn WebSocketExtensionFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// 设置输出缓冲的分配器。
    pub fn with_allocator(mut self, alloc: Arc<dyn ByteBufAllocator>) -> Self {
        self.alloc = alloc;
        self
    }

    pub fn no_context(&self) -> bool {
        self.no_context
    }

    /// 子管道当前是否存在，即解压上下文是否被保留。
    pub fn is_inflating(&self) -> bool {
        self.inflater.lock().is_some()
    }

    /// 是否处于一条压缩消息的中途。
    pub fn is_compressing(&self) -> bool {
        self.compressing.load(Ordering::Acquire)
    }

    fn decompress(&self, frame: &WebSocketFrame) -> Result<ByteBuf> {
        let content = frame.content()?;
        let mut guard = self.inflater.lock();
        let inflater = match &mut *guard {
            Some(inflater) => inflater,
            slot => {
                if !frame.kind().is_data() {
                    return Err(CoreError::new(
                        codes::CODEC_UNEXPECTED_MESSAGE,
                        format!("unexpected initial frame type: {:?}", frame.kind()),
                    ));
                }
                let inner = DecoderHandler::into_handler(RawInflater::new(Arc::clone(&self.alloc)));
                slot.insert(EmbeddedChannel::with_handlers([("inflater", inner)])?)
            }
        };

        let readable = content.is_readable();
        let empty_deflate_block = content.with_readable(|bytes| bytes == EMPTY_DEFLATE_BLOCK)?;

        let mut input = vec![content.retained_duplicate()?.into_message()];
        if frame.is_final_fragment() {
            input.push(Unpooled::copied(&FRAME_TAIL).into_message());
        }
        if let Err(err) = inflater.write_inbound(input) {
            inflater.release_inbound();
            return Err(err);
        }

        let mut composite = self.alloc.composite_buffer();
        while let Some(part) = inflater.read_inbound_as::<ByteBuf>() {
            composite.add_component(part)?;
        }

        let starved = !empty_deflate_block && readable && composite.num_components() == 0;
        if starved && frame.kind() != FrameKind::Continuation {
            composite.release()?;
            return Err(CoreError::new(
                codes::CODEC_DECOMPRESSION,
                "cannot read uncompressed buffer",
            ));
        }

        if frame.is_final_fragment() && self.no_context {
            if let Some(inflater) = guard.take() {
                shutdown(inflater);
            }
        }
        drop(guard);

        consolidate(composite, self.alloc.as_ref())
    }

    fn cleanup(&self) {
        if let Some(inflater) = self.inflater.lock().take() {
            shutdown(inflater);
        }
        self.compressing.store(false, Ordering::Release);
    }
}

fn consolidate(composite: CompositeByteBuf, alloc: &dyn ByteBufAllocator) -> Result<ByteBuf> {
    let merged = composite.consolidate(alloc);
    composite.release()?;
    merged
}

fn shutdown(inflater: EmbeddedChannel) {
    if let Err(err) = inflater.finish_and_release_all() {
        tracing::debug!(error = %err, "inflater finished with pending error");
    }
}

impl MessageDecoder for PerMessageDeflateDecoder {
    type Input = WebSocketFrame;

    fn decode(
        &self,
        _ctx: &dyn Context,
        frame: &WebSocketFrame,
        out: &mut Vec<PipelineMessage>,
    ) -> Result<()> {
        let content = self.decompress(frame)?;
        let new_rsv = if frame.rsv() & rsv::RSV1 != 0 {
            frame.rsv() ^ rsv::RSV1
        } else {
            frame.rsv()
        };
        out.push(frame.with_rsv(new_rsv, content).into_message());

        if frame.is_final_fragment() {
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
            FrameKind::Text | FrameKind::Binary => frame.rsv() & rsv::RSV1 != 0,
            FrameKind::Continuation => self.is_compressing(),
            _ => false,
        };
        candidate && !self.filter.must_skip(frame)
    }

    fn decoder_removed(&self, _ctx: &dyn Context) {
        self.cleanup();
    }

    fn channel_inactive(&self, _ctx: &dyn Context) {
        self.cleanup();
    }

    fn name(&self) -> &'static str {
        "PerMessageDeflateDecoder"
    }
}
