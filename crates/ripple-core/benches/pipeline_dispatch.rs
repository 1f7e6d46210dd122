use criterion::{Criterion, black_box};
use ripple_core::{
    EmbeddedChannel, PipelineMessage,
    pipeline::{Context, InboundHandler, handler_from_inbound},
};
use std::{env, time::Duration};

struct Passthrough;

impl InboundHandler for Passthrough {
    fn on_read(&self, ctx: &dyn Context, msg: PipelineMessage) {
        ctx.fire_read(msg);
    }
}

/// 入站派发成本：消息穿过 8 个透传节点后抵达尾部。
///
/// # 逻辑解析（How）
/// - 每次迭代写入一条消息并立即从尾部读出，测得的是单条消息的完整派发路径；
/// - 节点全部绑定在内联执行器上，不包含跨线程投递成本。
fn bench_inbound_dispatch(c: &mut Criterion) {
    let names: Vec<String> = (0..8).map(|i| format!("pass-{i}")).collect();
    let channel = match EmbeddedChannel::with_handlers(
        names
            .iter()
            .map(|name| (name.as_str(), handler_from_inbound(Passthrough))),
    ) {
        Ok(channel) => channel,
        Err(err) => panic!("failed to build bench pipeline: {err}"),
    };
    c.bench_function("pipeline_inbound_8_nodes", |b| {
        b.iter(|| {
            channel.pipeline().fire_read(PipelineMessage::new(black_box(7u64)));
            black_box(channel.read_inbound())
        });
    });
}

/// 链路变更成本：在尾部追加后立即移除一个节点。
fn bench_mutation(c: &mut Criterion) {
    let channel = match EmbeddedChannel::with_handlers([]) {
        Ok(channel) => channel,
        Err(err) => panic!("failed to build bench pipeline: {err}"),
    };
    let pipeline = channel.pipeline();
    c.bench_function("pipeline_add_remove", |b| {
        b.iter(|| {
            let _ = pipeline.add_last("transient", handler_from_inbound(Passthrough));
            black_box(pipeline.remove("transient").is_ok())
        });
    });
}

fn main() {
    let mut quick_mode = false;
    for arg in env::args().skip(1) {
        if arg == "--quick" {
            quick_mode = true;
        }
    }

    let mut criterion = Criterion::default();
    if quick_mode {
        criterion = criterion
            .sample_size(10)
            .warm_up_time(Duration::from_millis(100))
            .measurement_time(Duration::from_millis(250));
    }

    bench_inbound_dispatch(&mut criterion);
    bench_mutation(&mut criterion);
    criterion.final_summary();
}
