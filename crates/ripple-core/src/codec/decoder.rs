use std::{any::Any, sync::Arc};

use crate::{
    Result,
    message::PipelineMessage,
    pipeline::{Context, Handler, HandlerDescriptor, InboundHandler},
};

/// 消息到消息的解码器。
///
/// # 教案式说明
/// - **意图（Why）**：把“识别输入类型、调用解码、释放输入、逐条转发产物”这一固定流程
///   从具体协议中抽离，协议实现只需关心如何从一条输入得到零条或多条输出。
/// - **逻辑（How）**：[`DecoderHandler`] 在 `on_read` 中先用 [`accepts`](Self::accepts) 过滤，
///   命中时以借用方式调用 [`decode`](Self::decode)，随后释放输入，再按顺序转发输出列表。
/// - **契约（What）**：
///   - 解码器若要在输出中保留输入的内容，必须自行 `retain`，适配器总会释放一次输入；
///   - 返回错误时，已经写入输出列表的消息仍会被转发，错误随后沿异常路径传播；
///   - 不被接受的消息原样透传。
pub trait MessageDecoder: Send + Sync + 'static {
    /// 接受的输入类型。
    type Input: Any + Send;

    /// 解码一条输入。
    fn decode(
        &self,
        ctx: &dyn Context,
        input: &Self::Input,
        out: &mut Vec<PipelineMessage>,
    ) -> Result<()>;

    /// 是否处理该消息，默认按类型判断。
    fn accepts(&self, msg: &PipelineMessage) -> bool {
        msg.is::<Self::Input>()
    }

    /// 所在节点被移出 Pipeline。
    fn decoder_removed(&self, ctx: &dyn Context) {
        let _ = ctx;
    }

    /// 通道失活，调用后事件继续向后传播。
    fn channel_inactive(&self, ctx: &dyn Context) {
        let _ = ctx;
    }

    /// 元数据名称。
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// 将 [`MessageDecoder`] 挂载到 Pipeline 的入站节点。
pub struct DecoderHandler<D> {
    decoder: D,
}

impl<D: MessageDecoder> DecoderHandler<D> {
    /// 包装解码器。
    pub fn new(decoder: D) -> Self {
        Self { decoder }
    }

    /// 包装并转换为节点 Handler。
    pub fn into_handler(decoder: D) -> Arc<dyn Handler> {
        Arc::new(Self::new(decoder))
    }

    /// 内部解码器。
    pub fn decoder(&self) -> &D {
        &self.decoder
    }
}

impl<D: MessageDecoder> Handler for DecoderHandler<D> {
    fn describe(&self) -> HandlerDescriptor {
        HandlerDescriptor::new(self.decoder.name(), "codec")
    }

    fn handler_removed(&self, ctx: &dyn Context) {
        self.decoder.decoder_removed(ctx);
    }

    fn inbound(&self) -> Option<&dyn InboundHandler> {
        Some(self)
    }
}

impl<D: MessageDecoder> InboundHandler for DecoderHandler<D> {
    fn on_read(&self, ctx: &dyn Context, msg: PipelineMessage) {
        if !self.decoder.accepts(&msg) {
            ctx.fire_read(msg);
            return;
        }
        let mut out = Vec::new();
        let result = match msg.downcast_ref::<D::Input>() {
            Some(input) => self.decoder.decode(ctx, input, &mut out),
            None => {
                // `accepts` 被覆盖为放宽类型判断时，无法借用的消息直接透传。
                ctx.fire_read(msg);
                return;
            }
        };
        if let Err(err) = msg.release() {
            tracing::warn!(
                channel = %ctx.channel_id(),
                handler = ctx.name(),
                error = %err,
                "failed to release decoder input"
            );
        }
        for decoded in out {
            ctx.fire_read(decoded);
        }
        if let Err(err) = result {
            ctx.fire_exception_caught(err);
        }
    }

    fn on_channel_inactive(&self, ctx: &dyn Context) {
        self.decoder.channel_inactive(ctx);
        ctx.fire_channel_inactive();
    }
}
