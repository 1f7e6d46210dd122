#![deny(unsafe_code)]

//! `ripple-codec-ws` 提供 WebSocket 帧持有者与 `permessage-deflate` 扩展。
//!
//! # 模块定位（Why）
//! - 扩展协商与负载压缩只依赖帧类型、分片标记、保留位与负载，与帧头编解码无关，
//!   因此本 crate 只定义承载这些字段的 [`WebSocketFrame`]，并在其上实现扩展；
//! - 压缩与解压作为普通的编码器/解码器节点挂载到 `ripple-core` 的 Pipeline 上。
//!
//! # 设计概要（How）
//! - `frame`：帧持有者与保留位常量；
//! - `extension`：扩展数据模型、扩展头解析与帧过滤器；
//! - `handshaker`：服务端协商；
//! - `deflate`：压缩器、解压器与解压子管道中的原始 inflate 节点；
//! - `config`：可从 TOML 加载的协商策略。
//!
//! ```rust
//! use ripple_codec_ws::{PerMessageDeflateServerExtensionHandshaker, WebSocketExtensionData};
//!
//! let handshaker = PerMessageDeflateServerExtensionHandshaker::new();
//! let request = WebSocketExtensionData::new("permessage-deflate").with_flag("client_max_window_bits");
//! let extension = handshaker.handshake_extension(&request).unwrap();
//! assert_eq!(extension.rsv(), 0x04);
//! assert_eq!(extension.response_data().to_string(), "permessage-deflate");
//! ```

mod config;
pub mod deflate;
mod extension;
mod frame;
mod handshaker;

pub use config::DeflateConfig;
pub use deflate::{PerMessageDeflateDecoder, PerMessageDeflateEncoder, RawInflater};
pub use extension::{NeverSkip, WebSocketExtensionData, WebSocketExtensionFilter, encode_header};
pub use frame::{FrameKind, WebSocketFrame, rsv};
pub use handshaker::{
    CLIENT_MAX_WINDOW, CLIENT_NO_CONTEXT, MAX_WINDOW_SIZE, MIN_WINDOW_SIZE, PERMESSAGE_DEFLATE,
    PerMessageDeflateExtension, PerMessageDeflateServerExtensionHandshaker, SERVER_MAX_WINDOW,
    SERVER_NO_CONTEXT,
};
