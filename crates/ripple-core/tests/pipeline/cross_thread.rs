use std::{
    sync::{Arc, mpsc},
    time::Duration,
};

use ripple_core::{
    ChannelGroupFuture, EmbeddedChannel, EventExecutor, PipelineMessage, SingleThreadExecutor,
    error::codes,
    test_stubs::{RecordingHandler, event_log, snapshot},
};

/// 等待执行器处理完此前投递的全部任务。
fn drain(executor: &SingleThreadExecutor) {
    let (tx, rx) = mpsc::channel();
    executor
        .execute(Box::new(move || {
            let _ = tx.send(());
        }))
        .expect("投递排空任务");
    rx.recv_timeout(Duration::from_secs(5))
        .expect("执行器应在超时前排空");
}

#[test]
fn lifecycle_hooks_run_on_the_node_executor() {
    let worker = SingleThreadExecutor::spawn("ripple-worker").expect("启动执行器");
    let log = event_log();
    let channel = EmbeddedChannel::with_handlers([]).expect("创建嵌入式通道");
    let pipeline = Arc::clone(channel.pipeline());

    pipeline
        .add_last_on(
            Arc::clone(&worker) as Arc<dyn EventExecutor>,
            "remote",
            RecordingHandler::new("remote", &log).into_handler(),
        )
        .expect("添加远端节点");
    drain(&worker);
    assert_eq!(snapshot(&log), ["remote:added@ripple-worker"]);

    pipeline.remove("remote").expect("在主线程移除");
    drain(&worker);
    assert_eq!(
        snapshot(&log),
        ["remote:added@ripple-worker", "remote:removed@ripple-worker"]
    );
    worker.shutdown();
}

#[test]
fn events_hop_to_the_node_executor_and_back() {
    let worker = SingleThreadExecutor::spawn("ripple-hop").expect("启动执行器");
    let log = event_log();
    let channel = EmbeddedChannel::with_handlers([]).expect("创建嵌入式通道");
    let pipeline = Arc::clone(channel.pipeline());
    pipeline
        .add_last_on(
            Arc::clone(&worker) as Arc<dyn EventExecutor>,
            "remote",
            RecordingHandler::new("remote", &log).into_handler(),
        )
        .expect("添加远端节点");
    drain(&worker);

    for value in 0..8u32 {
        pipeline.fire_read(PipelineMessage::new(value));
    }
    drain(&worker);

    let reads = snapshot(&log)
        .into_iter()
        .filter(|event| event == "remote:read")
        .count();
    assert_eq!(reads, 8);
    let values: Vec<u32> = std::iter::from_fn(|| channel.read_inbound_as::<u32>()).collect();
    assert_eq!(values, (0..8).collect::<Vec<_>>(), "跨线程派发保持投递顺序");
    worker.shutdown();
}

#[test]
fn writes_through_a_closed_executor_fail_their_promise() {
    let worker = SingleThreadExecutor::spawn("ripple-closed").expect("启动执行器");
    let log = event_log();
    let channel = EmbeddedChannel::with_handlers([]).expect("创建嵌入式通道");
    let pipeline = Arc::clone(channel.pipeline());
    pipeline
        .add_last_on(
            Arc::clone(&worker) as Arc<dyn EventExecutor>,
            "remote",
            RecordingHandler::new("remote", &log).into_handler(),
        )
        .expect("添加远端节点");
    drain(&worker);
    worker.shutdown();

    let promise = channel.channel().write(PipelineMessage::new(1u32));
    assert!(promise.is_done(), "被拒绝的写入应立即完成");
    let cause = promise.cause().expect("失败原因");
    assert_eq!(cause.code(), codes::EXECUTOR_UNAVAILABLE);

    let group = ChannelGroupFuture::new([(channel.channel().id(), promise)]);
    assert!(group.is_done(), "组完成不应因执行器关闭而悬挂");
    assert!(!group.is_success());
    assert_eq!(channel.outbound_len(), 0);
}
