use criterion::{Criterion, black_box};
use ripple_buffer::{ByteBufAllocator, PooledByteBufAllocator, UnpooledByteBufAllocator};
use ripple_core::ReferenceCounted;
use std::{env, time::Duration};

/// 同尺寸级别反复分配与释放：池化路径应稳定命中自由链表。
fn bench_pooled(c: &mut Criterion) {
    let pool = PooledByteBufAllocator::new();
    c.bench_function("pool_alloc_release_1k", |b| {
        b.iter(|| {
            let buf = match pool.buffer(black_box(1024), 4096) {
                Ok(buf) => buf,
                Err(err) => panic!("allocation failed: {err}"),
            };
            black_box(buf.release().is_ok())
        });
    });
}

/// 对照组：每次都向系统申请存储。
fn bench_unpooled(c: &mut Criterion) {
    c.bench_function("unpooled_alloc_release_1k", |b| {
        b.iter(|| {
            let buf = match UnpooledByteBufAllocator.buffer(black_box(1024), 4096) {
                Ok(buf) => buf,
                Err(err) => panic!("allocation failed: {err}"),
            };
            black_box(buf.release().is_ok())
        });
    });
}

/// 切片创建与释放的计数开销。
fn bench_slice(c: &mut Criterion) {
    let pool = PooledByteBufAllocator::new();
    let mut parent = match pool.buffer(256, 256) {
        Ok(buf) => buf,
        Err(err) => panic!("allocation failed: {err}"),
    };
    if let Err(err) = parent.write_bytes(&[7u8; 256]) {
        panic!("write failed: {err}");
    }
    c.bench_function("slice_retain_release", |b| {
        b.iter(|| match parent.slice(black_box(16), 64) {
            Ok(slice) => black_box(slice.release().is_ok()),
            Err(err) => panic!("slice failed: {err}"),
        });
    });
    let _ = parent.release();
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

    bench_pooled(&mut criterion);
    bench_unpooled(&mut criterion);
    bench_slice(&mut criterion);
    criterion.final_summary();
}
