use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use futures::executor::block_on;
use ripple_core::{
    Channel, ChannelGroup, ChannelGroupFuture, ChannelId, ChannelPromise, CoreError,
    ImmediateExecutor, PipelineMessage, Transport,
    error::codes,
    test_stubs::RecordingTransport,
};

fn pending(count: u64) -> Vec<(ChannelId, ChannelPromise)> {
    (1..=count)
        .map(|raw| {
            let id = ChannelId::from_raw(raw);
            (id, ChannelPromise::for_channel(id))
        })
        .collect()
}

#[test]
fn empty_group_completes_immediately() {
    let future = ChannelGroupFuture::new(Vec::new());
    assert!(future.is_empty());
    assert!(future.is_done());
    assert!(future.is_success());
    assert!(!future.is_partial_success());
    assert!(!future.is_partial_failure());
    assert!(future.cause().is_none());
    block_on(future).expect("空组应立即成功");
}

#[test]
fn mixed_outcomes_report_partial_success_and_failure() {
    let members = pending(3);
    let future = ChannelGroupFuture::new(members.clone());
    assert_eq!(future.len(), 3);

    members[0].1.try_success();
    members[1]
        .1
        .try_failure(CoreError::new(codes::PIPELINE_CLOSED, "peer went away"));
    assert!(!future.is_done(), "仍有成员未完成");
    assert!(future.is_partial_success());
    assert!(future.is_partial_failure());

    members[2].1.try_success();
    assert!(future.is_done());
    assert!(!future.is_success());
    assert!(future.is_partial_success());
    assert!(future.is_partial_failure());

    let cause = future.cause().expect("聚合失败必须带原因");
    assert_eq!(cause.code(), codes::CHANNEL_GROUP_FAILURE);
    let detail = future.group_error().expect("应能取回逐通道明细");
    assert_eq!(detail.total(), 3);
    assert_eq!(detail.failures().len(), 1);
    let failed = ChannelId::from_raw(2);
    assert_eq!(
        detail.cause_of(failed).map(|c| c.code()),
        Some(codes::PIPELINE_CLOSED)
    );
    assert!(detail.to_string().starts_with("1 of 3 channel operations failed"));
    assert!(
        future
            .find(failed)
            .is_some_and(|promise| promise.ptr_eq(&members[1].1))
    );
    let err = block_on(future).expect_err("聚合结果应失败");
    assert_eq!(err.code(), codes::CHANNEL_GROUP_FAILURE);
}

#[test]
fn all_failures_are_not_partial() {
    let members = pending(2);
    let future = ChannelGroupFuture::new(members.clone());
    for (_, promise) in &members {
        promise.cancel();
    }
    assert!(future.is_done());
    assert!(!future.is_partial_failure());
    assert!(!future.is_partial_success());
    assert_eq!(future.group_error().map(|e| e.failures().len()), Some(2));
}

#[test]
fn aggregate_fires_exactly_once_under_concurrent_completion() {
    let members = pending(64);
    let future = ChannelGroupFuture::new(members.clone());
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    future.add_listener(move |done| {
        assert!(done.is_done());
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let handles: Vec<_> = members
        .chunks(8)
        .map(|chunk| {
            let chunk = chunk.to_vec();
            thread::spawn(move || {
                for (_, promise) in chunk {
                    promise.try_success();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("完成线程不应 panic");
    }

    block_on(future.clone()).expect("全部成功");
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    let late = Arc::new(AtomicUsize::new(0));
    let late_counter = Arc::clone(&late);
    future.add_listener(move |_| {
        late_counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(late.load(Ordering::SeqCst), 1, "完成后注册的监听器立即执行");
}

fn channel_on(transport: &Arc<RecordingTransport>) -> Arc<Channel> {
    Channel::new(
        Arc::clone(transport) as Arc<dyn Transport>,
        ImmediateExecutor::shared(),
    )
}

#[test]
fn group_broadcast_skips_server_channels() {
    let group = ChannelGroup::new("broadcast");
    let server_transport = RecordingTransport::shared();
    let server = Channel::server(
        Arc::clone(&server_transport) as Arc<dyn Transport>,
        ImmediateExecutor::shared(),
    );
    let transports: Vec<_> = (0..3).map(|_| RecordingTransport::shared()).collect();
    assert!(group.add(Arc::clone(&server)));
    for transport in &transports {
        assert!(group.add(channel_on(transport)));
    }
    assert!(!group.add(Arc::clone(&server)), "重复加入返回 false");
    assert_eq!(group.len(), 4);
    assert!(group.members()[0].is_server(), "监听型通道排在前面");

    let future = group.write_and_flush(|channel| PipelineMessage::new(channel.id()));
    assert_eq!(future.len(), 3);
    assert!(future.is_success());
    assert_eq!(server_transport.written_len(), 0);
    for transport in &transports {
        let written = transport.take_written();
        assert_eq!(written.len(), 1);
        assert_eq!(transport.flush_count(), 1);
    }
}

#[test]
fn closing_the_group_empties_it() {
    let group = ChannelGroup::new("close");
    let transports: Vec<_> = (0..4).map(|_| RecordingTransport::shared()).collect();
    let channels: Vec<_> = transports.iter().map(channel_on).collect();
    for channel in &channels {
        group.add(Arc::clone(channel));
    }

    let future = group.close();
    assert!(future.is_success());
    assert!(group.is_empty(), "关闭后的通道自动移出");
    assert!(transports.iter().all(|t| t.is_closed()));
}

#[test]
fn failed_writes_surface_per_channel() {
    let group = ChannelGroup::new("partial");
    let healthy = RecordingTransport::shared();
    let broken = RecordingTransport::shared();
    broken.fail_writes(true);
    let healthy_channel = channel_on(&healthy);
    let broken_channel = channel_on(&broken);
    group.add(Arc::clone(&healthy_channel));
    group.add(Arc::clone(&broken_channel));

    let future = group.write(|_| PipelineMessage::new("payload"));
    assert!(future.is_done());
    assert!(future.is_partial_success());
    assert!(future.is_partial_failure());
    let detail = future.group_error().expect("逐通道明细");
    assert!(detail.cause_of(broken_channel.id()).is_some());
    assert!(detail.cause_of(healthy_channel.id()).is_none());
}
