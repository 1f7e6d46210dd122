use std::sync::Arc;

use ripple_core::{
    Channel, CoreError, EmbeddedChannel, ImmediateExecutor, PipelineMessage,
    error::codes,
    pipeline::{Context, InboundHandler, handler_from_inbound},
    test_stubs::{RecordingHandler, RecordingTransport, event_log, snapshot},
};

fn recording_channel(
    labels: &[&str],
) -> (Arc<Channel>, Arc<RecordingTransport>, ripple_core::test_stubs::EventLog) {
    let log = event_log();
    let transport = RecordingTransport::shared();
    let channel = Channel::new(
        Arc::clone(&transport) as Arc<dyn ripple_core::Transport>,
        ImmediateExecutor::shared(),
    );
    for label in labels {
        channel
            .pipeline()
            .add_last(label, RecordingHandler::new(*label, &log).into_handler())
            .expect("添加记录型 Handler");
    }
    log.lock().clear();
    (channel, transport, log)
}

#[test]
fn inbound_runs_head_to_tail_and_outbound_tail_to_head() {
    let (channel, transport, log) = recording_channel(&["a", "b", "c"]);

    channel.pipeline().fire_read(PipelineMessage::new(1u8));
    assert_eq!(snapshot(&log), ["a:read", "b:read", "c:read"]);

    log.lock().clear();
    let promise = channel.write_and_flush(PipelineMessage::new(2u8));
    assert_eq!(
        snapshot(&log),
        ["c:write", "b:write", "a:write", "c:flush", "b:flush", "a:flush"]
    );
    assert!(promise.is_success(), "传输应完成写 Promise");
    assert_eq!(transport.written_len(), 1);
    assert_eq!(transport.flush_count(), 1);
}

#[test]
fn context_operations_start_next_to_the_node() {
    let (channel, transport, log) = recording_channel(&["a", "b", "c"]);
    let ctx = channel.pipeline().context("b").expect("b 的上下文");

    ctx.fire_read(PipelineMessage::new("from-b"));
    assert_eq!(snapshot(&log), ["c:read"], "入站转发只经过 b 之后的节点");

    log.lock().clear();
    let promise = ctx.new_promise();
    ctx.write(PipelineMessage::new("from-b"), promise.clone());
    assert_eq!(snapshot(&log), ["a:write"], "出站转发只经过 b 之前的节点");
    assert!(promise.is_success());
    assert_eq!(transport.written_len(), 1);
}

#[test]
fn close_completes_close_future() {
    let (channel, transport, log) = recording_channel(&["a"]);
    let close_future = channel.close_future();
    assert!(!close_future.is_done());
    let promise = channel.close();
    assert!(promise.is_success());
    assert!(close_future.is_success());
    assert!(transport.is_closed());
    assert_eq!(snapshot(&log), ["a:close"]);
}

struct Swallow;

impl InboundHandler for Swallow {
    fn on_read(&self, _ctx: &dyn Context, msg: PipelineMessage) {
        let _ = msg.release();
    }
}

#[test]
fn consumed_messages_do_not_reach_the_tail() {
    let channel = EmbeddedChannel::with_handlers([("swallow", handler_from_inbound(Swallow))])
        .expect("创建嵌入式通道");
    assert!(
        !channel
            .write_inbound([PipelineMessage::new(7u32)])
            .expect("写入入站")
    );
    assert!(channel.read_inbound().is_none());
}

struct Failing;

impl InboundHandler for Failing {
    fn on_read(&self, ctx: &dyn Context, msg: PipelineMessage) {
        let _ = msg.release();
        ctx.fire_exception_caught(CoreError::new(codes::PROTOCOL_DECODE, "malformed"));
    }
}

#[test]
fn unhandled_exception_reaches_the_tail() {
    let log = event_log();
    let channel = EmbeddedChannel::with_handlers([
        ("failing", handler_from_inbound(Failing)),
        ("observer", RecordingHandler::new("observer", &log).into_handler()),
    ])
    .expect("创建嵌入式通道");
    let err = channel
        .write_inbound([PipelineMessage::new(())])
        .expect_err("异常应抵达尾部并被报告");
    assert_eq!(err.code(), codes::PROTOCOL_DECODE);
    assert!(snapshot(&log).contains(&"observer:exception".to_owned()));
    channel.check_exception().expect("异常只报告一次");
}
