use ripple_buffer::ConfigError;
use serde::{Deserialize, Serialize};

use crate::handshaker::{MAX_WINDOW_SIZE, MIN_WINDOW_SIZE};

/// `permessage-deflate` 服务端协商策略。
///
/// # 契约说明（What）
/// - `compression_level` 取值 `0..=9`；
/// - `preferred_client_window_size` 取值 `8..=15`；
/// - `allow_server_window_size` 默认关闭：底层压缩实现固定使用 15 位窗口，
///   开启后协商结果会携带对端要求的窗口，但压缩器仍按最大窗口工作。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeflateConfig {
    /// 压缩级别。
    pub compression_level: u32,
    /// 是否接受客户端提出的 `server_max_window_bits`。
    pub allow_server_window_size: bool,
    /// 客户端声明支持 `client_max_window_bits` 时下发的窗口。
    pub preferred_client_window_size: u8,
    /// 是否接受客户端提出的 `server_no_context_takeover`。
    pub allow_server_no_context: bool,
    /// 客户端声明支持 `client_no_context_takeover` 时是否要求它。
    pub preferred_client_no_context: bool,
}

impl Default for DeflateConfig {
    fn default() -> Self {
        Self {
            compression_level: 6,
            allow_server_window_size: false,
            preferred_client_window_size: MAX_WINDOW_SIZE,
            allow_server_no_context: false,
            preferred_client_no_context: false,
        }
    }
}

impl DeflateConfig {
    /// 从 TOML 片段解析并校验。
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compression_level > 9 {
            return Err(ConfigError::invalid(
                "compression_level",
                format!("{} (expected: 0-9)", self.compression_level),
            ));
        }
        if !(MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&self.preferred_client_window_size) {
            return Err(ConfigError::invalid(
                "preferred_client_window_size",
                format!(
                    "{} (expected: {MIN_WINDOW_SIZE}-{MAX_WINDOW_SIZE})",
                    self.preferred_client_window_size
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = DeflateConfig::from_toml_str("allow_server_no_context = true")
            .expect("解析配置");
        assert!(config.allow_server_no_context);
        assert_eq!(config.compression_level, 6);
        assert_eq!(config.preferred_client_window_size, 15);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = DeflateConfig::from_toml_str("compression_level = 10").expect_err("级别越界");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "compression_level",
                ..
            }
        ));
        let err = DeflateConfig::from_toml_str("preferred_client_window_size = 7")
            .expect_err("窗口越界");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "preferred_client_window_size",
                ..
            }
        ));
    }
}
