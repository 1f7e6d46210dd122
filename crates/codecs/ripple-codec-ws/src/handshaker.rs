//! `permessage-deflate` 服务端协商。
//!
//! # 设计背景（Why）
//! - 客户端在握手请求中列出希望启用的扩展与参数，服务端只接受自身策略允许的组合，
//!   其余情况整体放弃该扩展，而不是部分接受。
//!
//! # 逻辑解析（How）
//! - 参数名先精确匹配，再按 ASCII 大小写不敏感匹配；任何未识别的参数都使扩展失效；
//! - `server_max_window_bits` 必须被策略允许且解析为 `[8, 15]` 内的整数；
//! - `server_no_context_takeover` 仅在策略允许时生效，否则扩展失效；
//! - 客户端侧参数只表示“客户端可以接受定制”，取值总是来自本地偏好。
//!
//! # 契约说明（What）
//! - 协商成功返回 [`PerMessageDeflateExtension`]，占用保留位 `RSV1`；
//! - 响应参数顺序固定为 `server_no_context_takeover`、`client_no_context_takeover`、
//!   `server_max_window_bits`、`client_max_window_bits`，窗口为 15 时省略。

use std::sync::Arc;

use ripple_buffer::ConfigError;
use ripple_core::{
    codec::{DecoderHandler, EncoderHandler},
    pipeline::Handler,
};

use crate::{
    config::DeflateConfig,
    deflate::{PerMessageDeflateDecoder, PerMessageDeflateEncoder},
    extension::WebSocketExtensionData,
    frame::rsv,
};

pub const MIN_WINDOW_SIZE: u8 = 8;
pub const MAX_WINDOW_SIZE: u8 = 15;

pub const PERMESSAGE_DEFLATE: &str = "permessage-deflate";
pub const CLIENT_MAX_WINDOW: &str = "client_max_window_bits";
pub const SERVER_MAX_WINDOW: &str = "server_max_window_bits";
pub const CLIENT_NO_CONTEXT: &str = "client_no_context_takeover";
pub const SERVER_NO_CONTEXT: &str = "server_no_context_takeover";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Parameter {
    ClientMaxWindow,
    ServerMaxWindow,
    ClientNoContext,
    ServerNoContext,
}

const VOCABULARY: [(&str, Parameter); 4] = [
    (CLIENT_MAX_WINDOW, Parameter::ClientMaxWindow),
    (SERVER_MAX_WINDOW, Parameter::ServerMaxWindow),
    (CLIENT_NO_CONTEXT, Parameter::ClientNoContext),
    (SERVER_NO_CONTEXT, Parameter::ServerNoContext),
];

fn classify(key: &str) -> Option<Parameter> {
    VOCABULARY
        .iter()
        .find(|(name, _)| *name == key)
        .or_else(|| VOCABULARY.iter().find(|(name, _)| name.eq_ignore_ascii_case(key)))
        .map(|(_, parameter)| *parameter)
}

fn is_permessage_deflate(name: &str) -> bool {
    name == PERMESSAGE_DEFLATE || name.eq_ignore_ascii_case(PERMESSAGE_DEFLATE)
}

/// 服务端协商器。
#[derive(Clone, Debug, Default)]
pub struct PerMessageDeflateServerExtensionHandshaker {
    config: DeflateConfig,
}

impl PerMessageDeflateServerExtensionHandshaker {
    /// 以默认策略创建。
    pub fn new() -> Self {
        Self::default()
    }

    /// 以给定策略创建。
    pub fn with_config(config: DeflateConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DeflateConfig {
        &self.config
    }

    /// 针对客户端请求的一个扩展进行协商；不匹配或被拒绝时返回 `None`。
    pub fn handshake_extension(
        &self,
        data: &WebSocketExtensionData,
    ) -> Option<PerMessageDeflateExtension> {
        if !is_permessage_deflate(data.name()) {
            return None;
        }

        let mut client_window_size = MAX_WINDOW_SIZE;
        let mut server_window_size = MAX_WINDOW_SIZE;
        let mut server_no_context = false;
        let mut client_no_context = false;

        for (key, value) in data.parameters() {
            let Some(parameter) = classify(key) else {
                tracing::debug!(parameter = %key, "permessage-deflate rejected: unknown parameter");
                return None;
            };
            match parameter {
                Parameter::ClientMaxWindow => {
                    client_window_size = self.config.preferred_client_window_size;
                }
                Parameter::ServerMaxWindow => {
                    if !self.config.allow_server_window_size {
                        tracing::debug!("permessage-deflate rejected: server window size not allowed");
                        return None;
                    }
                    let parsed = value
                        .as_deref()
                        .and_then(|raw| raw.trim().parse::<u8>().ok())
                        .filter(|bits| (MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(bits));
                    match parsed {
                        Some(bits) => server_window_size = bits,
                        None => {
                            tracing::debug!(
                                value = value.as_deref().unwrap_or("<none>"),
                                "permessage-deflate rejected: invalid server_max_window_bits"
                            );
                            return None;
                        }
                    }
                }
                Parameter::ClientNoContext => {
                    client_no_context = self.config.preferred_client_no_context;
                }
                Parameter::ServerNoContext => {
                    if !self.config.allow_server_no_context {
                        tracing::debug!("permessage-deflate rejected: server no-context not allowed");
                        return None;
                    }
                    server_no_context = true;
                }
            }
        }

        Some(PerMessageDeflateExtension {
            compression_level: self.config.compression_level,
            server_no_context,
            server_window_size,
            client_no_context,
            client_window_size,
        })
    }
}

/// 协商成功的 `permessage-deflate` 参数。
///
/// # 契约说明（What）
/// - 编码器压缩本端发出的消息，遵守 `server_no_context`；
/// - 解码器解压对端发来的消息，`client_no_context` 为真时每条消息结束后重置解压状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PerMessageDeflateExtension {
    compression_level: u32,
    server_no_context: bool,
    server_window_size: u8,
    client_no_context: bool,
    client_window_size: u8,
}

impl PerMessageDeflateExtension {
    /// 扩展占用的保留位。
    pub fn rsv(&self) -> u8 {
        rsv::RSV1
    }

    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    pub fn server_no_context(&self) -> bool {
        self.server_no_context
    }

    pub fn server_window_size(&self) -> u8 {
        self.server_window_size
    }

    pub fn client_no_context(&self) -> bool {
        self.client_no_context
    }

    pub fn client_window_size(&self) -> u8 {
        self.client_window_size
    }

    /// 出站压缩器。
    pub fn new_extension_encoder(&self) -> PerMessageDeflateEncoder {
        PerMessageDeflateEncoder::new(self.compression_level, self.server_no_context)
    }

    /// 入站解压器。
    pub fn new_extension_decoder(&self) -> PerMessageDeflateDecoder {
        PerMessageDeflateDecoder::new(self.client_no_context)
    }

    /// 出站压缩节点。
    pub fn encoder_handler(&self) -> Arc<dyn Handler> {
        EncoderHandler::into_handler(self.new_extension_encoder())
    }

    /// 入站解压节点。
    pub fn decoder_handler(&self) -> Arc<dyn Handler> {
        DecoderHandler::into_handler(self.new_extension_decoder())
    }

    /// 写回客户端的响应扩展数据。
    pub fn response_data(&self) -> WebSocketExtensionData {
        let mut data = WebSocketExtensionData::new(PERMESSAGE_DEFLATE);
        if self.server_no_context {
            data = data.with_flag(SERVER_NO_CONTEXT);
        }
        if self.client_no_context {
            data = data.with_flag(CLIENT_NO_CONTEXT);
        }
        if self.server_window_size != MAX_WINDOW_SIZE {
            data = data.with_parameter(SERVER_MAX_WINDOW, self.server_window_size.to_string());
        }
        if self.client_window_size != MAX_WINDOW_SIZE {
            data = data.with_parameter(CLIENT_MAX_WINDOW, self.client_window_size.to_string());
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn exact_match_wins_then_case_insensitive_fallback() {
        assert_eq!(classify("server_max_window_bits"), Some(Parameter::ServerMaxWindow));
        assert_eq!(classify("Client_No_Context_Takeover"), Some(Parameter::ClientNoContext));
        assert_eq!(classify("client_max_window"), None);
    }

    #[test]
    #[traced_test]
    fn rejection_is_logged_with_reason() {
        let handshaker = PerMessageDeflateServerExtensionHandshaker::new();
        let request = WebSocketExtensionData::new(PERMESSAGE_DEFLATE).with_flag("x_unknown");
        assert!(handshaker.handshake_extension(&request).is_none());
        assert!(logs_contain("unknown parameter"));
    }
}
