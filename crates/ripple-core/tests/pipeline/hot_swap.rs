use std::sync::Arc;

use ripple_core::{
    EmbeddedChannel, PipelineMessage,
    pipeline::{Context, InboundHandler, NodeState, handler_from_inbound},
    test_stubs::{RecordingHandler, event_log, snapshot},
};

/// 事件进行中插入的节点只影响之后的消息，顺序保持不变。
#[test]
fn insert_between_messages_keeps_order() {
    let log = event_log();
    let channel = EmbeddedChannel::with_handlers([(
        "tls",
        RecordingHandler::new("tls", &log).into_handler(),
    )])
    .expect("创建嵌入式通道");
    let pipeline = Arc::clone(channel.pipeline());
    log.lock().clear();

    channel
        .write_inbound([PipelineMessage::new(1u32)])
        .expect("第一条消息");
    let epoch_before = pipeline.epoch();
    pipeline
        .add_after("tls", "logging", RecordingHandler::new("log", &log).into_handler())
        .expect("插入 logging");
    assert!(pipeline.epoch() > epoch_before, "插入应推进纪元");
    channel
        .write_inbound([PipelineMessage::new(2u32)])
        .expect("第二条消息");

    let reads: Vec<_> = snapshot(&log)
        .into_iter()
        .filter(|event| event.ends_with(":read"))
        .collect();
    assert_eq!(reads, ["tls:read", "tls:read", "log:read"]);
    let values: Vec<u32> = std::iter::from_fn(|| channel.read_inbound_as::<u32>()).collect();
    assert_eq!(values, [1, 2]);
}

/// 在 `on_read` 中把自己移出链路，消息仍然继续流向后续节点。
struct RemoveSelf;

impl InboundHandler for RemoveSelf {
    fn on_read(&self, ctx: &dyn Context, msg: PipelineMessage) {
        ctx.pipeline()
            .remove(ctx.name())
            .expect("移除自身");
        assert!(ctx.is_removed());
        ctx.fire_read(msg);
    }
}

#[test]
fn handler_removing_itself_still_forwards() {
    let log = event_log();
    let channel = EmbeddedChannel::with_handlers([
        ("once", handler_from_inbound(RemoveSelf)),
        ("tail", RecordingHandler::new("tail", &log).into_handler()),
    ])
    .expect("创建嵌入式通道");

    channel
        .write_inbound([PipelineMessage::new(1u32), PipelineMessage::new(2u32)])
        .expect("写入入站");
    assert_eq!(channel.pipeline().names(), ["tail"]);
    let reads = snapshot(&log)
        .into_iter()
        .filter(|event| event == "tail:read")
        .count();
    assert_eq!(reads, 2, "两条消息都应抵达 tail");
    assert_eq!(channel.inbound_len(), 2);
    channel.finish_and_release_all().expect("finish");
}

/// 前一个节点在遍历中移除后一个节点，事件跳过被移除的节点。
struct RemoveNext {
    victim: &'static str,
}

impl InboundHandler for RemoveNext {
    fn on_read(&self, ctx: &dyn Context, msg: PipelineMessage) {
        if ctx.pipeline().get(self.victim).is_some() {
            ctx.pipeline().remove(self.victim).expect("移除后继节点");
        }
        ctx.fire_read(msg);
    }
}

#[test]
fn removal_ahead_of_traversal_skips_the_node() {
    let log = event_log();
    let channel = EmbeddedChannel::with_handlers([
        ("remover", handler_from_inbound(RemoveNext { victim: "victim" })),
        ("victim", RecordingHandler::new("victim", &log).into_handler()),
        ("after", RecordingHandler::new("after", &log).into_handler()),
    ])
    .expect("创建嵌入式通道");
    log.lock().clear();

    channel
        .write_inbound([PipelineMessage::new(())])
        .expect("写入入站");
    let events = snapshot(&log);
    assert!(events.iter().any(|e| e.starts_with("victim:removed@")));
    assert!(!events.contains(&"victim:read".to_owned()));
    assert!(events.contains(&"after:read".to_owned()));
}

#[test]
fn replace_swaps_handler_in_place() {
    let log = event_log();
    let channel = EmbeddedChannel::with_handlers([
        ("a", RecordingHandler::new("a", &log).into_handler()),
        ("b", RecordingHandler::new("b", &log).into_handler()),
    ])
    .expect("创建嵌入式通道");
    let pipeline = Arc::clone(channel.pipeline());
    let old_ctx = pipeline.context("a").expect("a 的上下文");

    pipeline
        .replace("a", "a2", RecordingHandler::new("a2", &log).into_handler())
        .expect("替换");
    assert_eq!(pipeline.names(), ["a2", "b"]);
    assert_eq!(old_ctx.state(), NodeState::Removed);
    assert_eq!(pipeline.state_of("a2"), Some(NodeState::Active));

    log.lock().clear();
    channel
        .write_inbound([PipelineMessage::new(())])
        .expect("写入入站");
    assert_eq!(snapshot(&log), ["a2:read", "b:read"]);
}
