//! 解码结果与消息到消息的编解码适配器。
//!
//! - [`DecodeResult`]：三态解码结果，可附着在产物上；
//! - [`MessageDecoder`] / [`DecoderHandler`]：入站方向的一对多转换；
//! - [`MessageEncoder`] / [`EncoderHandler`]：出站方向的一对多转换；
//! - [`SingleOutputEncoder`]：要求恰好一条输出的编码器包装。

mod decoder;
mod encoder;
mod result;

pub use decoder::{DecoderHandler, MessageDecoder};
pub use encoder::{EncoderHandler, MessageEncoder, SingleOutputEncoder};
pub use result::{DecodeResult, DecoderResultProvider};
