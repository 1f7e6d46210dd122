//! 缓冲池配置。
//!
//! # 设计背景（Why）
//! - 尺寸级别边界、自由链表深度与 Arena 数量直接决定池的内存占用与命中率，需要在部署时调整，
//!   因此以 `serde` 结构体承载，并支持从 TOML 片段加载。
//!
//! # 契约说明（What）
//! - 所有字段都有默认值，TOML 中缺省的字段沿用默认；
//! - [`PoolConfig::validate`] 在构造分配器前执行，违反约束时返回 [`ConfigError::Invalid`]。

use std::borrow::Cow;

use ripple_core::{CoreError, error::codes};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 配置解析或校验失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML 语法或字段类型错误。
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// 字段取值违反约束。
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        /// 字段名。
        field: &'static str,
        /// 原因。
        reason: Cow<'static, str>,
    },
}

impl ConfigError {
    /// 构造校验失败。
    pub fn invalid(field: &'static str, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        CoreError::new(codes::CONFIG_INVALID, err.to_string()).with_cause(err)
    }
}

/// 默认的单个缓冲最大容量，与 `i32::MAX` 对齐。
pub const DEFAULT_MAX_CAPACITY: usize = i32::MAX as usize;

/// 池化分配器的配置。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// 最小尺寸级别（字节），必须是 2 的幂。
    pub min_size_class: usize,
    /// 最大尺寸级别（字节），必须是 2 的幂；超过它的请求不经过池。
    pub max_size_class: usize,
    /// 每个尺寸级别自由链表的容量。
    pub free_list_depth: usize,
    /// Arena 数量，`0` 表示取可用并行度。
    pub arenas: usize,
    /// 未显式给出时缓冲的最大容量。
    pub default_max_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size_class: 64,
            max_size_class: 64 * 1024,
            free_list_depth: 256,
            arenas: 0,
            default_max_capacity: DEFAULT_MAX_CAPACITY,
        }
    }
}

impl PoolConfig {
    /// 从 TOML 片段解析并校验。
    ///
    /// ```rust
    /// use ripple_buffer::PoolConfig;
    ///
    /// let config = PoolConfig::from_toml_str("max_size_class = 4096\narenas = 2").unwrap();
    /// assert_eq!(config.max_size_class, 4096);
    /// assert_eq!(config.min_size_class, 64);
    /// ```
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验字段约束。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_size_class.is_power_of_two() {
            return Err(ConfigError::invalid(
                "min_size_class",
                format!("{} is not a power of two", self.min_size_class),
            ));
        }
        if !self.max_size_class.is_power_of_two() {
            return Err(ConfigError::invalid(
                "max_size_class",
                format!("{} is not a power of two", self.max_size_class),
            ));
        }
        if self.min_size_class > self.max_size_class {
            return Err(ConfigError::invalid(
                "min_size_class",
                "must not exceed max_size_class",
            ));
        }
        if self.free_list_depth == 0 {
            return Err(ConfigError::invalid("free_list_depth", "must be positive"));
        }
        if self.default_max_capacity == 0 || self.default_max_capacity > DEFAULT_MAX_CAPACITY {
            return Err(ConfigError::invalid(
                "default_max_capacity",
                format!("must be within 1..={DEFAULT_MAX_CAPACITY}"),
            ));
        }
        Ok(())
    }

    /// 实际使用的 Arena 数量。
    pub fn resolved_arenas(&self) -> usize {
        match self.arenas {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }

    /// 尺寸级别数量。
    pub fn size_class_count(&self) -> usize {
        (self.max_size_class.trailing_zeros() - self.min_size_class.trailing_zeros()) as usize + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PoolConfig::default();
        config.validate().expect("默认配置必须合法");
        assert_eq!(config.size_class_count(), 11);
        assert!(config.resolved_arenas() >= 1);
    }

    #[test]
    fn rejects_non_power_of_two_classes() {
        let err = PoolConfig::from_toml_str("min_size_class = 100").expect_err("100 不是 2 的幂");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "min_size_class",
                ..
            }
        ));
        let core: CoreError = err.into();
        assert_eq!(core.code(), codes::CONFIG_INVALID);
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = PoolConfig::from_toml_str("arenas = \"many\"").expect_err("类型错误");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
