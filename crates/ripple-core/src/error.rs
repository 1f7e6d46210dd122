use std::{borrow::Cow, error::Error, fmt, sync::Arc};

/// `CoreError` 是 `ripple` 各 crate 共享的稳定错误域。
///
/// # 设计背景（Why）
/// - 缓冲生命周期、越界访问、编解码失败与通道组聚合失败都需要合流为统一的错误码，
///   上层 Handler 才能在 `on_exception_caught` 中按码值决定关闭、记录或应答。
/// - 错误需要在线程间移动（事件可能被调度到其他执行器），因此所有字段均满足 `Send + Sync`。
///
/// # 逻辑解析（How）
/// - `code` 为 `'static` 字符串，遵循 `<领域>.<语义>` 约定，集中定义在 [`codes`]；
/// - `message` 面向排障人员；`cause` 保存可选底层原因并通过 [`Error::source`] 暴露。
///
/// # 契约说明（What）
/// - **前置条件**：调用方应使用 [`codes`] 中的码值；
/// - **后置条件**：除非显式调用 [`with_cause`](Self::with_cause)，错误不携带底层原因。
///
/// # 风险提示（Trade-offs）
/// - `CoreError` 不实现 `Clone`（底层原因是 `Box<dyn Error>`）；需要多处共享时请包裹为 [`SharedError`]。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<ErrorCause>,
}

/// `ErrorCause` 封装底层原因，保持 `Send + Sync` 以方便跨线程传递。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

/// 可共享的错误句柄。
///
/// Promise、解码结果与通道组聚合需要多次返回同一个原因对象，`Arc` 保证 `cause()` 的身份稳定。
pub type SharedError = Arc<CoreError>;

/// 框架统一的返回值别名，默认错误类型为 [`CoreError`]。
pub type Result<T, E = CoreError> = core::result::Result<T, E>;

impl CoreError {
    /// 构造核心错误。
    ///
    /// ```rust
    /// use ripple_core::{CoreError, error::codes};
    ///
    /// let err = CoreError::new(codes::BUFFER_ILLEGAL_REFERENCE_COUNT, "refCnt: 0");
    /// assert_eq!(err.code(), codes::BUFFER_ILLEGAL_REFERENCE_COUNT);
    /// assert!(err.cause().is_none());
    /// ```
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// 附带底层原因并返回新的核心错误。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 为现有错误设置底层原因。
    pub fn set_cause(&mut self, cause: impl Error + Send + Sync + 'static) {
        self.cause = Some(Box::new(cause));
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 获取底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// 将错误包裹为可共享句柄。
    pub fn into_shared(self) -> SharedError {
        Arc::new(self)
    }

    /// 按错误码前缀给出粗粒度分类。
    ///
    /// # 契约说明（What）
    /// - `buffer.illegal_reference_count` 归为 [`ErrorKind::Lifetime`]；
    /// - 其余 `buffer.*` 归为 [`ErrorKind::Bounds`]；
    /// - `protocol.*` 与 `codec.*` 归为 [`ErrorKind::Codec`]；
    /// - 未登记前缀回退为 [`ErrorKind::Other`]。
    pub fn kind(&self) -> ErrorKind {
        match self.code {
            codes::BUFFER_ILLEGAL_REFERENCE_COUNT => ErrorKind::Lifetime,
            code if code.starts_with("buffer.") => ErrorKind::Bounds,
            code if code.starts_with("protocol.") || code.starts_with("codec.") => {
                ErrorKind::Codec
            }
            code if code.starts_with("channel_group.") => ErrorKind::Aggregate,
            code if code.starts_with("pipeline.") => ErrorKind::Pipeline,
            code if code.starts_with("config.") => ErrorKind::Configuration,
            codes::OPERATION_CANCELLED => ErrorKind::Cancelled,
            _ => ErrorKind::Other,
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn Error + 'static))
    }
}

/// 错误分类，对应生命周期、边界、编解码与聚合四类故障。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 引用计数已归零后的访问。
    Lifetime,
    /// 索引或长度越界。
    Bounds,
    /// 协议或编解码违规。
    Codec,
    /// 通道组中存在失败成员。
    Aggregate,
    /// Pipeline 结构性错误（重名、找不到 Handler）。
    Pipeline,
    /// 配置校验失败。
    Configuration,
    /// 操作被取消。
    Cancelled,
    /// 未归类。
    Other,
}

/// 稳定错误码集合。
///
/// # 设计背景（Why）
/// - 错误码遵循 `<领域>.<语义>` 命名约定，便于在日志中检索与聚合；
/// - 码值一经发布即视为契约，调整语义时应新增码值而非复用。
pub mod codes {
    /// 引用计数非法（已释放后访问、释放次数超过持有次数、计数溢出）。
    pub const BUFFER_ILLEGAL_REFERENCE_COUNT: &str = "buffer.illegal_reference_count";
    /// 索引或长度越界。
    pub const BUFFER_INDEX_OUT_OF_BOUNDS: &str = "buffer.index_out_of_bounds";
    /// 缓冲参数非法（如初始容量大于最大容量）。
    pub const BUFFER_INVALID_ARGUMENT: &str = "buffer.invalid_argument";
    /// 协议解码失败。
    pub const PROTOCOL_DECODE: &str = "protocol.decode";
    /// 收到不符合当前状态的消息或帧类型。
    pub const CODEC_UNEXPECTED_MESSAGE: &str = "codec.unexpected_message";
    /// 编码器产出不符合契约（数量或类型）。
    pub const CODEC_ENCODER: &str = "codec.encoder";
    /// 解压缩阶段失败。
    pub const CODEC_DECOMPRESSION: &str = "codec.decompression";
    /// 压缩阶段失败。
    pub const CODEC_COMPRESSION: &str = "codec.compression";
    /// Pipeline 中已存在同名 Handler。
    pub const PIPELINE_DUPLICATE_NAME: &str = "pipeline.duplicate_name";
    /// Pipeline 中找不到指定 Handler。
    pub const PIPELINE_HANDLER_NOT_FOUND: &str = "pipeline.handler_not_found";
    /// 通道已关闭，无法继续派发。
    pub const PIPELINE_CLOSED: &str = "pipeline.closed";
    /// 操作被取消。
    pub const OPERATION_CANCELLED: &str = "operation.cancelled";
    /// 通道组至少一个成员失败。
    pub const CHANNEL_GROUP_FAILURE: &str = "channel_group.failure";
    /// 执行器无法启动或已关闭。
    pub const EXECUTOR_UNAVAILABLE: &str = "executor.unavailable";
    /// 配置非法。
    pub const CONFIG_INVALID: &str = "config.invalid";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_code_and_message() {
        let err = CoreError::new(codes::PROTOCOL_DECODE, "bad frame");
        assert_eq!(err.to_string(), "[protocol.decode] bad frame");
    }

    #[test]
    fn source_exposes_cause_chain() {
        let inner = CoreError::new(codes::BUFFER_INDEX_OUT_OF_BOUNDS, "index: 9");
        let outer = CoreError::new(codes::PROTOCOL_DECODE, "decode failed").with_cause(inner);
        let source = outer.source().expect("应暴露底层原因");
        assert_eq!(source.to_string(), "[buffer.index_out_of_bounds] index: 9");
    }

    #[test]
    fn kind_follows_code_prefix() {
        let cases = [
            (codes::BUFFER_ILLEGAL_REFERENCE_COUNT, ErrorKind::Lifetime),
            (codes::BUFFER_INDEX_OUT_OF_BOUNDS, ErrorKind::Bounds),
            (codes::CODEC_ENCODER, ErrorKind::Codec),
            (codes::PROTOCOL_DECODE, ErrorKind::Codec),
            (codes::CHANNEL_GROUP_FAILURE, ErrorKind::Aggregate),
            (codes::PIPELINE_DUPLICATE_NAME, ErrorKind::Pipeline),
            (codes::CONFIG_INVALID, ErrorKind::Configuration),
            (codes::OPERATION_CANCELLED, ErrorKind::Cancelled),
            ("custom.thing", ErrorKind::Other),
        ];
        for (code, expected) in cases {
            assert_eq!(CoreError::new(code, "x").kind(), expected, "code = {code}");
        }
    }
}
