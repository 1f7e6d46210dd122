use std::{net::SocketAddr, sync::Arc};

use crate::{
    CoreError,
    channel::{ChannelId, ChannelPromise},
    executor::EventExecutor,
    message::PipelineMessage,
};

use super::{
    Pipeline,
    handler::{Handler, UserEvent},
};

/// Handler 回调时获得的节点上下文。
///
/// # 教案式说明
/// - **意图（Why）**：Handler 需要把事件继续传给相邻节点，也需要发起出站操作；
///   上下文把“我在链路中的位置”封装起来，Handler 无需感知链路结构。
/// - **逻辑（How）**：`fire_*` 从当前节点之后寻找下一个活跃的入站节点；出站方法从当前节点之前
///   寻找下一个活跃的出站节点，找不到时分别落到尾部汇聚点与传输协作者。
/// - **契约（What）**：
///   - 上下文可以跨事件保存，但节点移除后 `is_removed()` 为 `true`，继续转发仍然安全；
///   - 出站方法接收显式 Promise，由最终处理者负责完成。
pub trait Context: Send + Sync {
    /// 节点名称。
    fn name(&self) -> &str;

    /// 所属通道。
    fn channel_id(&self) -> ChannelId;

    /// 所属 Pipeline。
    fn pipeline(&self) -> Arc<Pipeline>;

    /// 节点执行器。
    fn executor(&self) -> Arc<dyn EventExecutor>;

    /// 节点承载的 Handler。
    fn handler(&self) -> Arc<dyn Handler>;

    /// 节点是否已被移除。
    fn is_removed(&self) -> bool;

    /// 创建关联到本通道的 Promise。
    fn new_promise(&self) -> ChannelPromise {
        ChannelPromise::for_channel(self.channel_id())
    }

    /// 转发通道注册事件。
    fn fire_channel_registered(&self);

    /// 转发通道注销事件。
    fn fire_channel_unregistered(&self);

    /// 转发通道活跃事件。
    fn fire_channel_active(&self);

    /// 转发通道失活事件。
    fn fire_channel_inactive(&self);

    /// 转发读到的消息。
    fn fire_read(&self, msg: PipelineMessage);

    /// 转发读批次结束事件。
    fn fire_read_complete(&self);

    /// 转发用户事件。
    fn fire_user_event(&self, event: UserEvent);

    /// 转发可写性变化。
    fn fire_writability_changed(&self, is_writable: bool);

    /// 沿异常路径转发错误。
    fn fire_exception_caught(&self, error: CoreError);

    /// 绑定本地地址。
    fn bind(&self, local: SocketAddr, promise: ChannelPromise);

    /// 连接远端。
    fn connect(&self, remote: SocketAddr, local: Option<SocketAddr>, promise: ChannelPromise);

    /// 断开连接。
    fn disconnect(&self, promise: ChannelPromise);

    /// 关闭通道。
    fn close(&self, promise: ChannelPromise);

    /// 注销。
    fn deregister(&self, promise: ChannelPromise);

    /// 请求读取。
    fn read(&self);

    /// 写入消息。
    fn write(&self, msg: PipelineMessage, promise: ChannelPromise);

    /// 刷新。
    fn flush(&self);

    /// 写入并刷新。
    fn write_and_flush(&self, msg: PipelineMessage, promise: ChannelPromise) {
        self.write(msg, promise);
        self.flush();
    }
}
