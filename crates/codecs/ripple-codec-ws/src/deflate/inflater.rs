use std::sync::Arc;

use flate2::{Decompress, FlushDecompress, Status};
use ripple_buffer::{ByteBuf, ByteBufAllocator};
use ripple_core::{
    CoreError, PipelineMessage, Result, codec::MessageDecoder, error::codes, pipeline::Context,
};
use spin::Mutex;

use super::OUTPUT_CHUNK;

/// 无 zlib 头的原始 deflate 流解压器。
///
/// # 教案式说明
/// - **意图（Why）**：作为解压子管道中唯一的节点，把连续写入的压缩片段还原为明文缓冲。
/// - **逻辑（How）**：
///   1. 每条输入以同步刷新方式喂给同一个 `flate2::Decompress`，跨输入保留滑动窗口；
///   2. 每轮最多产出 8 KiB，输出填满时继续循环，直到输入耗尽且输出未填满；
///   3. 流结束后的剩余输入被丢弃。
/// - **契约（What）**：压缩数据损坏时返回 `codec.decompression`；没有产出时不写任何输出。
pub struct RawInflater {
    state: Mutex<InflateState>,
    alloc: Arc<dyn ByteBufAllocator>,
}

struct InflateState {
    inflater: Decompress,
    finished: bool,
}

impl RawInflater {
    pub fn new(alloc: Arc<dyn ByteBufAllocator>) -> Self {
        Self {
            state: Mutex::new(InflateState {
                inflater: Decompress::new(false),
                finished: false,
            }),
            alloc,
        }
    }

    fn inflate(&self, input: &[u8], out: &mut Vec<PipelineMessage>) -> Result<()> {
        let mut state = self.state.lock();
        if state.finished {
            if !input.is_empty() {
                tracing::debug!(bytes = input.len(), "input after end of deflate stream discarded");
            }
            return Ok(());
        }
        let mut consumed = 0;
        loop {
            let mut chunk = vec![0u8; OUTPUT_CHUNK];
            let before_in = state.inflater.total_in();
            let before_out = state.inflater.total_out();
            let status = state
                .inflater
                .decompress(&input[consumed..], &mut chunk, FlushDecompress::Sync)
                .map_err(|err| {
                    CoreError::new(codes::CODEC_DECOMPRESSION, format!("invalid deflate data: {err}"))
                        .with_cause(err)
                })?;
            let read = (state.inflater.total_in() - before_in) as usize;
            let written = (state.inflater.total_out() - before_out) as usize;
            consumed += read;
            if written > 0 {
                let mut part = self.alloc.buffer_with_capacity(written)?;
                part.write_bytes(&chunk[..written])?;
                out.push(part.into_message());
            }
            if status == Status::StreamEnd {
                state.finished = true;
                break;
            }
            let drained = consumed == input.len() && written < OUTPUT_CHUNK;
            if drained || (read == 0 && written == 0) {
                break;
            }
        }
        Ok(())
    }
}

impl MessageDecoder for RawInflater {
    type Input = ByteBuf;

    fn decode(
        &self,
        _ctx: &dyn Context,
        input: &ByteBuf,
        out: &mut Vec<PipelineMessage>,
    ) -> Result<()> {
        let data = input.to_vec()?;
        self.inflate(&data, out)
    }

    fn name(&self) -> &'static str {
        "RawInflater"
    }
}
