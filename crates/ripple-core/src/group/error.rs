use std::fmt::Write as _;

use thiserror::Error;

use crate::{SharedError, channel::ChannelId};

/// 通道组操作的聚合失败原因，按成员顺序列出每个失败通道及其错误。
#[derive(Clone, Debug, Error)]
#[error(
    "{} of {} channel operations failed: {}",
    .failures.len(),
    .total,
    render_failures(.failures)
)]
pub struct ChannelGroupError {
    total: usize,
    failures: Vec<(ChannelId, SharedError)>,
}

impl ChannelGroupError {
    pub(crate) fn new(total: usize, failures: Vec<(ChannelId, SharedError)>) -> Self {
        Self { total, failures }
    }

    /// 参与操作的通道总数。
    pub fn total(&self) -> usize {
        self.total
    }

    /// 失败的通道及原因。
    pub fn failures(&self) -> &[(ChannelId, SharedError)] {
        &self.failures
    }

    /// 指定通道的失败原因。
    pub fn cause_of(&self, channel: ChannelId) -> Option<&SharedError> {
        self.failures
            .iter()
            .find(|(id, _)| *id == channel)
            .map(|(_, cause)| cause)
    }
}

fn render_failures(failures: &[(ChannelId, SharedError)]) -> String {
    let mut rendered = String::new();
    for (index, (channel, cause)) in failures.iter().enumerate() {
        if index > 0 {
            rendered.push_str("; ");
        }
        let _ = write!(rendered, "{channel}: {cause}");
    }
    rendered
}
