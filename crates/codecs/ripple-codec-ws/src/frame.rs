//! WebSocket 帧持有者。
//!
//! 帧头的解析与序列化不在本 crate 内；这里的帧只承载扩展处理所需的字段：
//! 帧类型、是否为最后一个分片、保留位与负载缓冲。

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use ripple_buffer::{ByteBuf, ByteBufHolder, checked_content};
use ripple_core::{PipelineMessage, ReferenceCounted, Result};

/// 帧头保留位。
pub mod rsv {
    /// 由 `permessage-deflate` 占用。
    pub const RSV1: u8 = 0x04;
    pub const RSV2: u8 = 0x02;
    pub const RSV3: u8 = 0x01;
}

/// 帧类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl FrameKind {
    /// 线上操作码。
    pub fn opcode(self) -> u8 {
        match self {
            FrameKind::Continuation => 0x0,
            FrameKind::Text => 0x1,
            FrameKind::Binary => 0x2,
            FrameKind::Close => 0x8,
            FrameKind::Ping => 0x9,
            FrameKind::Pong => 0xA,
        }
    }

    /// 是否为数据帧（文本或二进制）。
    pub fn is_data(self) -> bool {
        matches!(self, FrameKind::Text | FrameKind::Binary)
    }

    pub fn is_control(self) -> bool {
        matches!(self, FrameKind::Close | FrameKind::Ping | FrameKind::Pong)
    }
}

/// 持有负载缓冲的 WebSocket 帧。
///
/// # 契约说明（What）
/// - `replace` 保留帧类型、分片标记与保留位，只替换负载；
/// - 计数操作转交负载缓冲；
/// - 相等性要求帧头字段相同且负载可读区域逐字节相同。
pub struct WebSocketFrame {
    kind: FrameKind,
    final_fragment: bool,
    rsv: u8,
    content: ByteBuf,
}

impl WebSocketFrame {
    pub fn new(kind: FrameKind, final_fragment: bool, rsv: u8, content: ByteBuf) -> Self {
        Self {
            kind,
            final_fragment,
            rsv,
            content,
        }
    }

    /// 完整的文本帧。
    pub fn text(content: ByteBuf) -> Self {
        Self::new(FrameKind::Text, true, 0, content)
    }

    /// 完整的二进制帧。
    pub fn binary(content: ByteBuf) -> Self {
        Self::new(FrameKind::Binary, true, 0, content)
    }

    /// 延续帧。
    pub fn continuation(final_fragment: bool, content: ByteBuf) -> Self {
        Self::new(FrameKind::Continuation, final_fragment, 0, content)
    }

    pub fn ping(content: ByteBuf) -> Self {
        Self::new(FrameKind::Ping, true, 0, content)
    }

    pub fn pong(content: ByteBuf) -> Self {
        Self::new(FrameKind::Pong, true, 0, content)
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn is_final_fragment(&self) -> bool {
        self.final_fragment
    }

    pub fn rsv(&self) -> u8 {
        self.rsv
    }

    /// 以新的保留位与负载构造同类型、同分片标记的帧。
    pub fn with_rsv(&self, rsv: u8, content: ByteBuf) -> Self {
        Self::new(self.kind, self.final_fragment, rsv, content)
    }

    /// 取出负载，计数不变。
    pub fn into_content(self) -> ByteBuf {
        self.content
    }

    /// 包装为引用计数的管道消息。
    pub fn into_message(self) -> PipelineMessage {
        PipelineMessage::reference_counted(self)
    }
}

impl ReferenceCounted for WebSocketFrame {
    fn ref_cnt(&self) -> i32 {
        self.content.ref_cnt()
    }

    fn retain_n(&self, increment: i32) -> Result<()> {
        self.content.retain_n(increment)
    }

    fn release_n(&self, decrement: i32) -> Result<bool> {
        self.content.release_n(decrement)
    }

    fn touch_hint(&self, hint: &str) {
        self.content.touch_hint(hint);
    }
}

impl ByteBufHolder for WebSocketFrame {
    fn content(&self) -> Result<&ByteBuf> {
        checked_content(&self.content)
    }

    fn replace(&self, content: ByteBuf) -> Self {
        self.with_rsv(self.rsv, content)
    }
}

impl PartialEq for WebSocketFrame {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.final_fragment == other.final_fragment
            && self.rsv == other.rsv
            && self.content == other.content
    }
}

impl Eq for WebSocketFrame {}

impl Hash for WebSocketFrame {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.final_fragment.hash(state);
        self.rsv.hash(state);
        self.content.hash(state);
    }
}

impl fmt::Debug for WebSocketFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WebSocketFrame({:?}, fin: {}, rsv: {:#x}, {:?})",
            self.kind, self.final_fragment, self.rsv, self.content
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_buffer::Unpooled;

    #[test]
    fn replace_keeps_header_fields() {
        let frame = WebSocketFrame::new(FrameKind::Text, false, rsv::RSV1, Unpooled::copied(b"a"));
        let copy = frame.copy().expect("深拷贝");
        assert_eq!(copy.kind(), FrameKind::Text);
        assert!(!copy.is_final_fragment());
        assert_eq!(copy.rsv(), rsv::RSV1);
        assert_eq!(frame, copy);
        frame.release().expect("释放");
        copy.release().expect("释放");
    }

    #[test]
    fn opcodes_follow_the_wire_format() {
        assert_eq!(FrameKind::Continuation.opcode(), 0);
        assert_eq!(FrameKind::Pong.opcode(), 0xA);
        assert!(FrameKind::Binary.is_data());
        assert!(FrameKind::Close.is_control());
    }
}
