use std::sync::Arc;

use ripple_core::{
    CoreError, EmbeddedChannel, PipelineMessage, RefCount, ReferenceCounted, Result,
    codec::{DecoderHandler, EncoderHandler, MessageDecoder, MessageEncoder, SingleOutputEncoder},
    error::codes,
    pipeline::Context,
};

/// 计数由测试持有的引用计数消息。
struct Tracked {
    text: String,
    count: Arc<RefCount>,
}

impl ReferenceCounted for Tracked {
    fn ref_cnt(&self) -> i32 {
        self.count.get()
    }

    fn retain_n(&self, increment: i32) -> Result<()> {
        self.count.retain(increment)
    }

    fn release_n(&self, decrement: i32) -> Result<bool> {
        self.count.release(decrement)
    }
}

/// 按逗号拆分文本。
struct CommaSplitter;

impl MessageDecoder for CommaSplitter {
    type Input = Tracked;

    fn decode(
        &self,
        _ctx: &dyn Context,
        input: &Tracked,
        out: &mut Vec<PipelineMessage>,
    ) -> Result<()> {
        for part in input.text.split(',') {
            if part.is_empty() {
                return Err(CoreError::new(codes::PROTOCOL_DECODE, "empty segment"));
            }
            out.push(PipelineMessage::new(part.to_owned()));
        }
        Ok(())
    }
}

fn tracked(text: &str) -> (PipelineMessage, Arc<RefCount>) {
    let count = Arc::new(RefCount::new());
    let msg = PipelineMessage::reference_counted(Tracked {
        text: text.to_owned(),
        count: Arc::clone(&count),
    });
    (msg, count)
}

#[test]
fn decoder_forwards_outputs_in_order_and_releases_input() {
    let channel =
        EmbeddedChannel::with_handlers([("split", DecoderHandler::into_handler(CommaSplitter))])
            .expect("创建嵌入式通道");
    let (msg, count) = tracked("a,b,c");
    assert!(channel.write_inbound([msg]).expect("解码"));
    assert_eq!(count.get(), 0, "输入应被释放");
    let parts: Vec<String> = std::iter::from_fn(|| channel.read_inbound_as::<String>()).collect();
    assert_eq!(parts, ["a", "b", "c"]);
}

#[test]
fn decoder_passes_other_types_through() {
    let channel =
        EmbeddedChannel::with_handlers([("split", DecoderHandler::into_handler(CommaSplitter))])
            .expect("创建嵌入式通道");
    channel
        .write_inbound([PipelineMessage::new(42u64)])
        .expect("透传");
    assert_eq!(channel.read_inbound_as::<u64>(), Some(42));
}

#[test]
fn decoder_error_follows_already_decoded_outputs() {
    let channel =
        EmbeddedChannel::with_handlers([("split", DecoderHandler::into_handler(CommaSplitter))])
            .expect("创建嵌入式通道");
    let (msg, count) = tracked("a,,b");
    let err = channel.write_inbound([msg]).expect_err("空片段应报错");
    assert_eq!(err.code(), codes::PROTOCOL_DECODE);
    assert_eq!(count.get(), 0);
    assert_eq!(channel.read_inbound_as::<String>().as_deref(), Some("a"));
    assert!(channel.read_inbound().is_none());
}

/// 把数字编码为 `n` 个字节片段，`0` 不产生输出。
struct Fanout;

impl MessageEncoder for Fanout {
    type Input = u32;

    fn encode(&self, _ctx: &dyn Context, input: &u32, out: &mut Vec<PipelineMessage>) -> Result<()> {
        for index in 0..*input {
            out.push(PipelineMessage::new(vec![index as u8]));
        }
        Ok(())
    }
}

#[test]
fn encoder_writes_every_output_and_completes_once_all_done() {
    let channel = EmbeddedChannel::with_handlers([("fanout", EncoderHandler::into_handler(Fanout))])
        .expect("创建嵌入式通道");
    assert!(
        channel
            .write_outbound([PipelineMessage::new(3u32)])
            .expect("编码")
    );
    let written: Vec<Vec<u8>> =
        std::iter::from_fn(|| channel.read_outbound_as::<Vec<u8>>()).collect();
    assert_eq!(written, [vec![0], vec![1], vec![2]]);
}

#[test]
fn encoder_without_output_fails_the_write() {
    let channel = EmbeddedChannel::with_handlers([("fanout", EncoderHandler::into_handler(Fanout))])
        .expect("创建嵌入式通道");
    let err = channel
        .write_outbound([PipelineMessage::new(0u32)])
        .expect_err("无输出应失败");
    assert_eq!(err.code(), codes::CODEC_ENCODER);
    assert_eq!(channel.outbound_len(), 0);
}

#[test]
fn single_output_encoder_rejects_other_cardinalities() {
    let channel = EmbeddedChannel::with_handlers([(
        "single",
        EncoderHandler::into_handler(SingleOutputEncoder::new(Fanout)),
    )])
    .expect("创建嵌入式通道");

    assert!(
        channel
            .write_outbound([PipelineMessage::new(1u32)])
            .expect("恰好一条输出")
    );
    assert_eq!(channel.read_outbound_as::<Vec<u8>>(), Some(vec![0]));

    let err = channel
        .write_outbound([PipelineMessage::new(2u32)])
        .expect_err("两条输出应失败");
    assert_eq!(err.code(), codes::CODEC_ENCODER);
    assert!(err.message().contains("produced 2"));
    assert_eq!(channel.outbound_len(), 0, "失败时不写出任何片段");
}
