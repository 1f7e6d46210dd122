//! 通道组与组操作的聚合完成。

mod error;
mod future;

use std::{fmt, sync::Arc};

use dashmap::DashMap;

pub use error::ChannelGroupError;
pub use future::ChannelGroupFuture;

use crate::{
    channel::{Channel, ChannelId},
    message::PipelineMessage,
};

/// 具名的通道集合，支持对全部成员广播写入、刷新、断开与关闭。
///
/// # 教案式说明
/// - **意图（Why）**：服务端常需要对一批连接执行同一操作（广播消息、优雅关闭），
///   并关心整体与逐通道的结果。
/// - **逻辑（How）**：监听型通道与普通通道分存于两个 `DashMap`；遍历时先监听型、后普通，
///   关闭监听端在前可以阻止新连接在关闭过程中加入。加入时在通道的 `close_future`
///   上注册回调，通道关闭后自动移出。
/// - **契约（What）**：
///   - 写入与刷新只作用于普通通道；
///   - 广播写入以消息工厂为每个通道构造独立消息，工厂对每个通道恰好调用一次；
///   - 所有组操作返回 [`ChannelGroupFuture`]，零个成员时立即成功。
pub struct ChannelGroup {
    name: String,
    server_channels: DashMap<ChannelId, Arc<Channel>>,
    channels: DashMap<ChannelId, Arc<Channel>>,
}

impl ChannelGroup {
    /// 创建空组。
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            server_channels: DashMap::new(),
            channels: DashMap::new(),
        })
    }

    /// 组名。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 加入通道；已存在时返回 `false`。
    pub fn add(self: &Arc<Self>, channel: Arc<Channel>) -> bool {
        let id = channel.id();
        let map = if channel.is_server() {
            &self.server_channels
        } else {
            &self.channels
        };
        if map.insert(id, Arc::clone(&channel)).is_some() {
            return false;
        }
        tracing::debug!(group = %self.name, channel = %id, "channel joined group");
        let group = Arc::downgrade(self);
        channel.close_future().add_listener(move |_| {
            if let Some(group) = group.upgrade() {
                group.remove(id);
            }
        });
        true
    }

    /// 移出通道。
    pub fn remove(&self, id: ChannelId) -> Option<Arc<Channel>> {
        let removed = self
            .server_channels
            .remove(&id)
            .or_else(|| self.channels.remove(&id))
            .map(|(_, channel)| channel);
        if removed.is_some() {
            tracing::debug!(group = %self.name, channel = %id, "channel left group");
        }
        removed
    }

    /// 是否包含通道。
    pub fn contains(&self, id: ChannelId) -> bool {
        self.server_channels.contains_key(&id) || self.channels.contains_key(&id)
    }

    /// 查找通道。
    pub fn find(&self, id: ChannelId) -> Option<Arc<Channel>> {
        self.server_channels
            .get(&id)
            .or_else(|| self.channels.get(&id))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// 成员数量。
    pub fn len(&self) -> usize {
        self.server_channels.len() + self.channels.len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 先监听型、后普通通道的成员快照。
    pub fn members(&self) -> Vec<Arc<Channel>> {
        let mut members: Vec<_> = self
            .server_channels
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        members.extend(self.channels.iter().map(|entry| Arc::clone(entry.value())));
        members
    }

    fn non_server_members(&self) -> Vec<Arc<Channel>> {
        self.channels
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// 向全部普通通道写入。
    pub fn write(&self, factory: impl Fn(&Channel) -> PipelineMessage) -> ChannelGroupFuture {
        self.write_matching(|_| true, factory)
    }

    /// 向满足条件的普通通道写入。
    pub fn write_matching(
        &self,
        matcher: impl Fn(&Channel) -> bool,
        factory: impl Fn(&Channel) -> PipelineMessage,
    ) -> ChannelGroupFuture {
        ChannelGroupFuture::new(
            self.non_server_members()
                .into_iter()
                .filter(|channel| matcher(channel))
                .map(|channel| (channel.id(), channel.write(factory(&channel)))),
        )
    }

    /// 刷新全部普通通道。
    pub fn flush(&self) {
        for channel in self.non_server_members() {
            channel.flush();
        }
    }

    /// 向全部普通通道写入并刷新。
    pub fn write_and_flush(
        &self,
        factory: impl Fn(&Channel) -> PipelineMessage,
    ) -> ChannelGroupFuture {
        ChannelGroupFuture::new(
            self.non_server_members()
                .into_iter()
                .map(|channel| (channel.id(), channel.write_and_flush(factory(&channel)))),
        )
    }

    /// 断开全部通道。
    pub fn disconnect(&self) -> ChannelGroupFuture {
        ChannelGroupFuture::new(
            self.members()
                .into_iter()
                .map(|channel| (channel.id(), channel.disconnect())),
        )
    }

    /// 关闭全部通道。
    pub fn close(&self) -> ChannelGroupFuture {
        self.close_matching(|_| true)
    }

    /// 关闭满足条件的通道。
    pub fn close_matching(&self, matcher: impl Fn(&Channel) -> bool) -> ChannelGroupFuture {
        ChannelGroupFuture::new(
            self.members()
                .into_iter()
                .filter(|channel| matcher(channel))
                .map(|channel| (channel.id(), channel.close())),
        )
    }
}

impl fmt::Debug for ChannelGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelGroup")
            .field("name", &self.name)
            .field("server_channels", &self.server_channels.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}
