//! 扩展协商数据模型与帧过滤。
//!
//! # 设计背景（Why）
//! - `Sec-WebSocket-Extensions` 头携带若干扩展，每个扩展是名称加有序参数表；
//!   参数要么是 `key=value`，要么只有 `key`（存在即为真）。协商逻辑依赖参数的原始顺序，
//!   因此参数以 `Vec` 保存而非映射表。
//!
//! # 契约说明（What）
//! - [`WebSocketExtensionData::parse_header`] 按逗号切分扩展、按分号切分参数，忽略空段，
//!   去掉值两侧的双引号；
//! - [`encode_header`] 是它的逆过程，参数顺序保持不变。

use std::fmt;

use crate::frame::WebSocketFrame;

/// 一个扩展的名称与参数。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebSocketExtensionData {
    name: String,
    parameters: Vec<(String, Option<String>)>,
}

impl WebSocketExtensionData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
        }
    }

    /// 追加带值参数。
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((key.into(), Some(value.into())));
        self
    }

    /// 追加无值参数。
    pub fn with_flag(mut self, key: impl Into<String>) -> Self {
        self.parameters.push((key.into(), None));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 按出现顺序排列的参数。
    pub fn parameters(&self) -> &[(String, Option<String>)] {
        &self.parameters
    }

    /// 按名称精确查找参数；外层 `None` 表示参数不存在，内层表示参数无值。
    pub fn parameter(&self, key: &str) -> Option<Option<&str>> {
        self.parameters
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_deref())
    }

    /// 解析扩展头的值。
    ///
    /// ```rust
    /// use ripple_codec_ws::WebSocketExtensionData;
    ///
    /// let parsed = WebSocketExtensionData::parse_header(
    ///     "permessage-deflate; client_max_window_bits, x-custom; level=\"3\"",
    /// );
    /// assert_eq!(parsed.len(), 2);
    /// assert_eq!(parsed[0].parameter("client_max_window_bits"), Some(None));
    /// assert_eq!(parsed[1].parameter("level"), Some(Some("3")));
    /// ```
    pub fn parse_header(value: &str) -> Vec<Self> {
        value
            .split(',')
            .filter_map(|raw| {
                let mut segments = raw.split(';').map(str::trim);
                let name = segments.next().filter(|name| !name.is_empty())?;
                let mut data = Self::new(name);
                for segment in segments.filter(|segment| !segment.is_empty()) {
                    match segment.split_once('=') {
                        Some((key, value)) => {
                            data = data.with_parameter(key.trim(), value.trim().trim_matches('"'));
                        }
                        None => data = data.with_flag(segment),
                    }
                }
                Some(data)
            })
            .collect()
    }
}

impl fmt::Display for WebSocketExtensionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (key, value) in &self.parameters {
            match value {
                Some(value) => write!(f, "; {key}={value}")?,
                None => write!(f, "; {key}")?,
            }
        }
        Ok(())
    }
}

/// 把多个扩展编码为扩展头的值。
pub fn encode_header(extensions: &[WebSocketExtensionData]) -> String {
    extensions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// 决定某个帧是否绕过扩展处理。
pub trait WebSocketExtensionFilter: Send + Sync + 'static {
    /// 返回 `true` 时该帧原样透传。
    fn must_skip(&self, frame: &WebSocketFrame) -> bool;
}

/// 不跳过任何帧。
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverSkip;

impl WebSocketExtensionFilter for NeverSkip {
    fn must_skip(&self, _frame: &WebSocketFrame) -> bool {
        false
    }
}

impl<F> WebSocketExtensionFilter for F
where
    F: Fn(&WebSocketFrame) -> bool + Send + Sync + 'static,
{
    fn must_skip(&self, frame: &WebSocketFrame) -> bool {
        self(frame)
    }
}
