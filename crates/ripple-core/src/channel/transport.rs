use std::net::SocketAddr;

use crate::message::PipelineMessage;

use super::ChannelPromise;

/// Pipeline 头部哨兵背后的传输协作者。
///
/// # 教案式说明
/// - **意图（Why）**：出站事件穿过全部 Handler 后需要落到真正的套接字；套接字 I/O 不在核心范围内，
///   因此以 trait 抽象，TCP/UDP 或内存实现各自接入。
/// - **逻辑（How）**：Pipeline 在通道执行器上调用这些方法；实现方负责最终完成传入的 Promise。
/// - **契约（What）**：
///   - 默认实现立即以成功完成 Promise，`write` 默认释放消息；
///   - 实现不得阻塞调用线程，耗时 I/O 应交给自身的驱动。
pub trait Transport: Send + Sync + 'static {
    /// 绑定本地地址。
    fn bind(&self, local: SocketAddr, promise: ChannelPromise) {
        let _ = local;
        promise.try_success();
    }

    /// 连接远端地址。
    fn connect(&self, remote: SocketAddr, local: Option<SocketAddr>, promise: ChannelPromise) {
        let _ = (remote, local);
        promise.try_success();
    }

    /// 断开连接。
    fn disconnect(&self, promise: ChannelPromise) {
        promise.try_success();
    }

    /// 关闭通道。
    fn close(&self, promise: ChannelPromise) {
        promise.try_success();
    }

    /// 从执行器注销。
    fn deregister(&self, promise: ChannelPromise) {
        promise.try_success();
    }

    /// 请求读取更多数据。
    fn begin_read(&self) {}

    /// 写入消息到发送缓冲。
    fn write(&self, msg: PipelineMessage, promise: ChannelPromise) {
        if let Err(err) = msg.release() {
            promise.try_failure(err);
            return;
        }
        promise.try_success();
    }

    /// 冲刷发送缓冲。
    fn flush(&self) {}
}

/// 丢弃所有写入的传输实现。
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardTransport;

impl Transport for DiscardTransport {}
