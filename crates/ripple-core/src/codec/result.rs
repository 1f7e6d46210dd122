use std::{fmt, sync::Arc};

use crate::{CoreError, SharedError};

/// 一次解码尝试的结果。
///
/// # 教案式说明
/// - **意图（Why）**：解码器常常需要把“数据尚不完整”“已成功”“失败及其原因”附着在产物上，
///   而不是直接抛出异常事件；三态结果让下游按需检查。
/// - **逻辑（How）**：`Unfinished` 与 `Success` 是无负载的哨兵值，`Failure` 携带共享的错误，
///   克隆结果不会复制错误本体。
/// - **契约（What）**：
///   - `is_finished()` 仅在 `Unfinished` 时为 `false`；
///   - `cause()` 仅在 `Failure` 时返回 `Some`；
///   - 两个 `Failure` 只有在指向同一错误实例时才相等。
#[derive(Clone, Debug)]
pub enum DecodeResult {
    /// 输入不足，尚未完成。
    Unfinished,
    /// 已成功完成。
    Success,
    /// 以给定原因失败。
    Failure(SharedError),
}

impl DecodeResult {
    /// 以错误构造失败结果。
    pub fn failure(cause: CoreError) -> Self {
        Self::Failure(Arc::new(cause))
    }

    /// 是否已经结束（成功或失败）。
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Unfinished)
    }

    /// 是否成功。
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// 是否失败。
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// 失败原因。
    pub fn cause(&self) -> Option<&SharedError> {
        match self {
            Self::Failure(cause) => Some(cause),
            _ => None,
        }
    }
}

impl PartialEq for DecodeResult {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unfinished, Self::Unfinished) | (Self::Success, Self::Success) => true,
            (Self::Failure(a), Self::Failure(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for DecodeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unfinished => f.write_str("unfinished"),
            Self::Success => f.write_str("success"),
            Self::Failure(cause) => write!(f, "failure({cause})"),
        }
    }
}

/// 携带解码结果的消息。
pub trait DecoderResultProvider {
    /// 当前解码结果。
    fn decoder_result(&self) -> &DecodeResult;

    /// 更新解码结果。
    fn set_decoder_result(&mut self, result: DecodeResult);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;

    #[test]
    fn sentinels_report_their_state() {
        assert!(!DecodeResult::Unfinished.is_finished());
        assert!(DecodeResult::Unfinished.cause().is_none());
        assert!(DecodeResult::Success.is_finished());
        assert!(DecodeResult::Success.is_success());
        assert!(!DecodeResult::Success.is_failure());
        assert!(DecodeResult::Success.cause().is_none());
    }

    #[test]
    fn failure_exposes_cause_and_renders_it() {
        let result = DecodeResult::failure(CoreError::new(codes::PROTOCOL_DECODE, "bad frame"));
        assert!(result.is_finished());
        assert!(result.is_failure());
        assert!(!result.is_success());
        let cause = result.cause().expect("失败结果必须带原因");
        assert_eq!(cause.code(), codes::PROTOCOL_DECODE);
        assert_eq!(result.to_string(), "failure([protocol.decode] bad frame)");
        assert_eq!(DecodeResult::Unfinished.to_string(), "unfinished");
        assert_eq!(DecodeResult::Success.to_string(), "success");
    }

    #[test]
    fn failures_compare_by_identity() {
        let a = DecodeResult::failure(CoreError::new(codes::PROTOCOL_DECODE, "x"));
        let b = DecodeResult::failure(CoreError::new(codes::PROTOCOL_DECODE, "x"));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(DecodeResult::Success, DecodeResult::Success);
        assert_ne!(DecodeResult::Success, DecodeResult::Unfinished);
    }
}
