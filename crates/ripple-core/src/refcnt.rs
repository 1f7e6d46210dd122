//! 显式引用计数契约。
//!
//! # 设计背景（Why）
//! - 池化缓冲的生命周期无法完全交给 `Drop`：同一块存储会被切片、复制视图与组合缓冲共享，
//!   且可能在多个通道的执行器上被持有与释放，因此需要与 Netty 一致的显式 `retain`/`release` 协议。
//! - [`RefCount`] 提供原子计数的通用实现，缓冲、组合缓冲与 Holder 均复用它的边界检查。
//!
//! # 契约说明（What）
//! - 新对象计数为 1；`retain` 递增，`release` 递减，降为 0 的那一次调用返回 `true` 并负责回收；
//! - 计数为 0 后任何 `retain` 或访问均返回 `buffer.illegal_reference_count`；
//! - 释放次数超过持有次数同样返回该错误，计数保持不变。

use core::sync::atomic::{AtomicI32, Ordering};

use crate::error::{CoreError, Result, codes};

/// 引用计数能力。
///
/// # 契约说明（What）
/// - `ref_cnt` 返回当前计数；并发读取只保证是某一时刻的快照；
/// - `retain_n`/`release_n` 的参数必须为正，否则返回 `buffer.invalid_argument`；
/// - `touch_hint` 只记录调试提示，不影响计数；未实现泄漏追踪的类型可以忽略提示。
pub trait ReferenceCounted {
    /// 当前引用计数。
    fn ref_cnt(&self) -> i32;

    /// 计数加 `increment`。
    fn retain_n(&self, increment: i32) -> Result<()>;

    /// 计数减 `decrement`，当且仅当本次调用使计数归零时返回 `true`。
    fn release_n(&self, decrement: i32) -> Result<bool>;

    /// 记录调试提示，计数不变。
    fn touch_hint(&self, hint: &str) {
        let _ = hint;
    }

    /// 计数加一。
    fn retain(&self) -> Result<()> {
        self.retain_n(1)
    }

    /// 计数减一。
    fn release(&self) -> Result<bool> {
        self.release_n(1)
    }

    /// 记录匿名访问点。
    fn touch(&self) {
        self.touch_hint("touch");
    }
}

/// 原子引用计数器。
///
/// # 逻辑解析（How）
/// - 使用 CAS 循环而非 `fetch_add`：计数已为 0 时必须拒绝 `retain`，不能先加后判；
/// - 溢出通过 `checked_add` 检测，失败时计数保持原值。
#[derive(Debug)]
pub struct RefCount {
    value: AtomicI32,
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

impl RefCount {
    /// 以计数 1 创建。
    pub const fn new() -> Self {
        Self {
            value: AtomicI32::new(1),
        }
    }

    /// 当前计数。
    pub fn get(&self) -> i32 {
        self.value.load(Ordering::Acquire)
    }

    /// 计数大于 0 时返回 `Ok`。
    pub fn ensure_accessible(&self) -> Result<()> {
        let current = self.get();
        if current > 0 {
            Ok(())
        } else {
            Err(illegal_reference_count(current, 0))
        }
    }

    /// 增加计数。
    pub fn retain(&self, increment: i32) -> Result<()> {
        check_positive(increment, "increment")?;
        let mut current = self.value.load(Ordering::Relaxed);
        loop {
            if current <= 0 {
                return Err(illegal_reference_count(current, increment));
            }
            let next = current
                .checked_add(increment)
                .ok_or_else(|| illegal_reference_count(current, increment))?;
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    /// 减少计数，归零时返回 `true`。
    pub fn release(&self, decrement: i32) -> Result<bool> {
        check_positive(decrement, "decrement")?;
        let mut current = self.value.load(Ordering::Relaxed);
        loop {
            if current < decrement {
                return Err(illegal_reference_count(current, -decrement));
            }
            let next = current - decrement;
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(next == 0),
                Err(observed) => current = observed,
            }
        }
    }
}

fn check_positive(value: i32, name: &'static str) -> Result<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(CoreError::new(
            codes::BUFFER_INVALID_ARGUMENT,
            format!("{name}: {value} (expected: > 0)"),
        ))
    }
}

/// 构造统一格式的引用计数错误。
pub fn illegal_reference_count(ref_cnt: i32, delta: i32) -> CoreError {
    let message = if delta == 0 {
        format!("refCnt: {ref_cnt}")
    } else {
        format!("refCnt: {ref_cnt}, delta: {delta}")
    };
    CoreError::new(codes::BUFFER_ILLEGAL_REFERENCE_COUNT, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn retain_then_release_restores_count() {
        let count = RefCount::new();
        count.retain(1).expect("retain 应成功");
        assert_eq!(count.get(), 2);
        assert!(!count.release(1).expect("第一次释放"));
        assert!(count.release(1).expect("第二次释放应归零"));
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn retain_after_zero_is_rejected() {
        let count = RefCount::new();
        assert!(count.release(1).expect("释放"));
        let err = count.retain(1).expect_err("归零后不可 retain");
        assert_eq!(err.code(), codes::BUFFER_ILLEGAL_REFERENCE_COUNT);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn over_release_leaves_count_untouched() {
        let count = RefCount::new();
        let err = count.release(2).expect_err("超额释放应失败");
        assert_eq!(err.code(), codes::BUFFER_ILLEGAL_REFERENCE_COUNT);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn overflow_is_reported() {
        let count = RefCount::new();
        let err = count.retain(i32::MAX).expect_err("溢出应失败");
        assert_eq!(err.code(), codes::BUFFER_ILLEGAL_REFERENCE_COUNT);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn non_positive_delta_is_invalid_argument() {
        let count = RefCount::new();
        assert_eq!(
            count.retain(0).expect_err("0 非法").code(),
            codes::BUFFER_INVALID_ARGUMENT
        );
        assert_eq!(
            count.release(-1).expect_err("负数非法").code(),
            codes::BUFFER_INVALID_ARGUMENT
        );
    }

    #[test]
    fn concurrent_retain_release_reaches_zero_exactly_once() {
        let count = Arc::new(RefCount::new());
        count.retain(8 * 1000).expect("预先持有");
        let zeroed: usize = (0..8)
            .map(|_| {
                let count = Arc::clone(&count);
                thread::spawn(move || {
                    (0..1000)
                        .filter(|_| count.release(1).expect("并发释放"))
                        .count()
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().expect("线程 join"))
            .sum();
        assert_eq!(zeroed, 0);
        assert!(count.release(1).expect("最后一次释放"));
    }
}
