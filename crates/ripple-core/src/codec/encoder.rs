use std::{
    any::Any,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use spin::Mutex;

use crate::{
    CoreError, Result, SharedError,
    channel::ChannelPromise,
    error::codes,
    message::PipelineMessage,
    pipeline::{Context, Handler, HandlerDescriptor, OutboundHandler},
};

/// 消息到消息的编码器。
///
/// # 契约说明（What）
/// - 输出列表为空视为编码失败，写 Promise 以 `codec.encoder` 失败；
/// - 输出多条时每条独立写出，原 Promise 在全部完成后完成，任一失败即以首个原因失败；
/// - 编码返回错误时，已产生的输出会被释放，写 Promise 以该错误失败。
pub trait MessageEncoder: Send + Sync + 'static {
    /// 接受的输入类型。
    type Input: Any + Send;

    /// 编码一条输入。
    fn encode(
        &self,
        ctx: &dyn Context,
        input: &Self::Input,
        out: &mut Vec<PipelineMessage>,
    ) -> Result<()>;

    /// 是否处理该消息，默认按类型判断。
    fn accepts(&self, msg: &PipelineMessage) -> bool {
        msg.is::<Self::Input>()
    }

    /// 元数据名称。
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// 将 [`MessageEncoder`] 挂载到 Pipeline 的出站节点。
pub struct EncoderHandler<E> {
    encoder: E,
}

impl<E: MessageEncoder> EncoderHandler<E> {
    /// 包装编码器。
    pub fn new(encoder: E) -> Self {
        Self { encoder }
    }

    /// 包装并转换为节点 Handler。
    pub fn into_handler(encoder: E) -> Arc<dyn Handler> {
        Arc::new(Self::new(encoder))
    }

    /// 内部编码器。
    pub fn encoder(&self) -> &E {
        &self.encoder
    }
}

impl<E: MessageEncoder> Handler for EncoderHandler<E> {
    fn describe(&self) -> HandlerDescriptor {
        HandlerDescriptor::new(self.encoder.name(), "codec")
    }

    fn outbound(&self) -> Option<&dyn OutboundHandler> {
        Some(self)
    }
}

impl<E: MessageEncoder> OutboundHandler for EncoderHandler<E> {
    fn on_write(&self, ctx: &dyn Context, msg: PipelineMessage, promise: ChannelPromise) {
        if !self.encoder.accepts(&msg) {
            ctx.write(msg, promise);
            return;
        }
        let mut out = Vec::new();
        let result = match msg.downcast_ref::<E::Input>() {
            Some(input) => self.encoder.encode(ctx, input, &mut out),
            None => {
                ctx.write(msg, promise);
                return;
            }
        };
        if let Err(err) = msg.release() {
            tracing::warn!(
                channel = %ctx.channel_id(),
                handler = ctx.name(),
                error = %err,
                "failed to release encoder input"
            );
        }
        if let Err(err) = result {
            release_all(out);
            promise.try_failure(err);
            return;
        }
        match out.len() {
            0 => {
                promise.try_failure(CoreError::new(
                    codes::CODEC_ENCODER,
                    format!("{} must produce at least one message", self.encoder.name()),
                ));
            }
            1 => {
                if let Some(encoded) = out.pop() {
                    ctx.write(encoded, promise);
                }
            }
            n => {
                let combiner = PromiseCombiner::new(n, promise);
                for encoded in out {
                    let part = ctx.new_promise();
                    combiner.add(&part);
                    ctx.write(encoded, part);
                }
            }
        }
    }
}

/// 强制编码器恰好产生一条输出。
///
/// 用于下游只接受单条消息的场景（例如把一个数据报封装为一个数据报）；
/// 输出条数不为一时释放已产生的输出并以 `codec.encoder` 失败。
pub struct SingleOutputEncoder<E> {
    inner: E,
}

impl<E: MessageEncoder> SingleOutputEncoder<E> {
    /// 包装编码器。
    pub fn new(inner: E) -> Self {
        Self { inner }
    }

    /// 内部编码器。
    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: MessageEncoder> MessageEncoder for SingleOutputEncoder<E> {
    type Input = E::Input;

    fn encode(
        &self,
        ctx: &dyn Context,
        input: &Self::Input,
        out: &mut Vec<PipelineMessage>,
    ) -> Result<()> {
        let mut produced = Vec::with_capacity(1);
        self.inner.encode(ctx, input, &mut produced)?;
        if produced.len() != 1 {
            let count = produced.len();
            release_all(produced);
            return Err(CoreError::new(
                codes::CODEC_ENCODER,
                format!(
                    "{} must produce exactly one message, produced {count}",
                    self.inner.name()
                ),
            ));
        }
        out.append(&mut produced);
        Ok(())
    }

    fn accepts(&self, msg: &PipelineMessage) -> bool {
        self.inner.accepts(msg)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// 把多个分片 Promise 汇聚到一个目标 Promise。
struct PromiseCombiner {
    remaining: AtomicUsize,
    failure: Mutex<Option<SharedError>>,
    target: ChannelPromise,
}

impl PromiseCombiner {
    fn new(expected: usize, target: ChannelPromise) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(expected),
            failure: Mutex::new(None),
            target,
        })
    }

    fn add(self: &Arc<Self>, part: &ChannelPromise) {
        let combiner = Arc::clone(self);
        part.add_listener(move |done| combiner.on_part_done(done));
    }

    fn on_part_done(&self, part: &ChannelPromise) {
        if let Some(cause) = part.cause() {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                *failure = Some(cause);
            }
        }
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let failure = self.failure.lock().take();
            match failure {
                Some(cause) => self.target.try_failure_shared(cause),
                None => self.target.try_success(),
            };
        }
    }
}

fn release_all(messages: Vec<PipelineMessage>) {
    for msg in messages {
        if let Err(err) = msg.release() {
            tracing::warn!(error = %err, "failed to release encoder output");
        }
    }
}
