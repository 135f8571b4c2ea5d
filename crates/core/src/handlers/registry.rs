use async_trait::async_trait;
use dispatch_domain::{DispatchMessage, MessageContext, MessageResult};
use dispatch_errors::{DispatchError, DispatchResult};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Fire-and-forget handler for messages of type `M`.
#[async_trait]
pub trait MessageHandler<M>: Send + Sync {
    async fn handle(&self, message: &M, context: &MessageContext) -> DispatchResult<()>;
}

/// Handler that produces a typed response.
#[async_trait]
pub trait RequestHandler<M>: Send + Sync {
    type Response: Send + Sync + 'static;

    async fn handle(&self, message: &M, context: &MessageContext)
        -> DispatchResult<Self::Response>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerLifetime {
    /// 单例，首次使用时创建
    Singleton,
    /// 每次分发创建新实例
    Transient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRegistryEntry {
    pub message_type: &'static str,
    pub handler_type: &'static str,
    pub expects_response: bool,
    pub lifetime: HandlerLifetime,
}

#[async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    async fn invoke(
        &self,
        message: &dyn DispatchMessage,
        context: &MessageContext,
    ) -> DispatchResult<MessageResult>;
}

fn downcast<'m, M: Any>(message: &'m dyn DispatchMessage) -> DispatchResult<&'m M> {
    message.downcast_ref::<M>().ok_or_else(|| {
        DispatchError::Internal(format!(
            "message type mismatch: expected {}, got {}",
            std::any::type_name::<M>(),
            message.message_type()
        ))
    })
}

struct MessageHandlerAdapter<M, H> {
    handler: H,
    _message: PhantomData<fn(M)>,
}

#[async_trait]
impl<M, H> ErasedHandler for MessageHandlerAdapter<M, H>
where
    M: Any + Send + Sync,
    H: MessageHandler<M>,
{
    async fn invoke(
        &self,
        message: &dyn DispatchMessage,
        context: &MessageContext,
    ) -> DispatchResult<MessageResult> {
        let typed = downcast::<M>(message)?;
        self.handler.handle(typed, context).await?;
        Ok(MessageResult::success())
    }
}

struct RequestHandlerAdapter<M, H> {
    handler: H,
    _message: PhantomData<fn(M)>,
}

#[async_trait]
impl<M, H> ErasedHandler for RequestHandlerAdapter<M, H>
where
    M: Any + Send + Sync,
    H: RequestHandler<M>,
{
    async fn invoke(
        &self,
        message: &dyn DispatchMessage,
        context: &MessageContext,
    ) -> DispatchResult<MessageResult> {
        let typed = downcast::<M>(message)?;
        let response = self.handler.handle(typed, context).await?;
        Ok(MessageResult::success_with(response))
    }
}

type HandlerFactory = Arc<dyn Fn() -> Arc<dyn ErasedHandler> + Send + Sync>;

enum HandlerSource {
    Singleton {
        factory: HandlerFactory,
        instance: OnceLock<Arc<dyn ErasedHandler>>,
    },
    Transient(HandlerFactory),
}

impl HandlerSource {
    fn resolve(&self) -> Arc<dyn ErasedHandler> {
        match self {
            HandlerSource::Singleton { factory, instance } => {
                instance.get_or_init(|| factory()).clone()
            }
            HandlerSource::Transient(factory) => factory(),
        }
    }
}

struct Registration {
    entry: HandlerRegistryEntry,
    source: HandlerSource,
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    registrations: HashMap<TypeId, Registration>,
}

impl HandlerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert<M: Any>(&mut self, entry: HandlerRegistryEntry, source: HandlerSource) {
        if let Some(previous) = self
            .registrations
            .insert(TypeId::of::<M>(), Registration { entry, source })
        {
            debug!(
                message_type = previous.entry.message_type,
                replaced = previous.entry.handler_type,
                "Handler registration replaced"
            );
        }
    }

    fn source(lifetime: HandlerLifetime, factory: HandlerFactory) -> HandlerSource {
        match lifetime {
            HandlerLifetime::Singleton => HandlerSource::Singleton {
                factory,
                instance: OnceLock::new(),
            },
            HandlerLifetime::Transient => HandlerSource::Transient(factory),
        }
    }

    /// 注册单例处理器实例
    pub fn register_handler<M, H>(self, handler: H) -> Self
    where
        M: Any + Send + Sync,
        H: MessageHandler<M> + 'static,
    {
        let adapter: Arc<dyn ErasedHandler> = Arc::new(MessageHandlerAdapter {
            handler,
            _message: PhantomData::<fn(M)>,
        });
        self.register_erased::<M>(
            std::any::type_name::<H>(),
            false,
            HandlerLifetime::Singleton,
            Arc::new(move || adapter.clone()),
        )
    }

    pub fn register_handler_factory<M, H, F>(self, lifetime: HandlerLifetime, factory: F) -> Self
    where
        M: Any + Send + Sync,
        H: MessageHandler<M> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.register_erased::<M>(
            std::any::type_name::<H>(),
            false,
            lifetime,
            Arc::new(move || {
                Arc::new(MessageHandlerAdapter {
                    handler: factory(),
                    _message: PhantomData::<fn(M)>,
                }) as Arc<dyn ErasedHandler>
            }),
        )
    }

    /// Registers a singleton request handler instance.
    pub fn register_request_handler<M, H>(self, handler: H) -> Self
    where
        M: Any + Send + Sync,
        H: RequestHandler<M> + 'static,
    {
        let adapter: Arc<dyn ErasedHandler> = Arc::new(RequestHandlerAdapter {
            handler,
            _message: PhantomData::<fn(M)>,
        });
        self.register_erased::<M>(
            std::any::type_name::<H>(),
            true,
            HandlerLifetime::Singleton,
            Arc::new(move || adapter.clone()),
        )
    }

    pub fn register_request_handler_factory<M, H, F>(
        self,
        lifetime: HandlerLifetime,
        factory: F,
    ) -> Self
    where
        M: Any + Send + Sync,
        H: RequestHandler<M> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.register_erased::<M>(
            std::any::type_name::<H>(),
            true,
            lifetime,
            Arc::new(move || {
                Arc::new(RequestHandlerAdapter {
                    handler: factory(),
                    _message: PhantomData::<fn(M)>,
                }) as Arc<dyn ErasedHandler>
            }),
        )
    }

    fn register_erased<M: Any>(
        mut self,
        handler_type: &'static str,
        expects_response: bool,
        lifetime: HandlerLifetime,
        factory: HandlerFactory,
    ) -> Self {
        let entry = HandlerRegistryEntry {
            message_type: std::any::type_name::<M>(),
            handler_type,
            expects_response,
            lifetime,
        };
        self.insert::<M>(entry, Self::source(lifetime, factory));
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            registrations: self.registrations,
        }
    }
}

/// Immutable message-type to handler map. Resolution is by exact runtime type.
pub struct HandlerRegistry {
    registrations: HashMap<TypeId, Registration>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new()
    }

    pub fn try_get_handler<M: Any>(&self) -> Option<&HandlerRegistryEntry> {
        self.try_get_handler_for(TypeId::of::<M>())
    }

    pub fn try_get_handler_for(&self, type_id: TypeId) -> Option<&HandlerRegistryEntry> {
        self.registrations.get(&type_id).map(|r| &r.entry)
    }

    pub fn entries(&self) -> impl Iterator<Item = &HandlerRegistryEntry> {
        self.registrations.values().map(|r| &r.entry)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// 按生命周期解析 `type_id` 对应的处理器实例
    pub(crate) fn resolve(
        &self,
        type_id: TypeId,
    ) -> Option<(&HandlerRegistryEntry, Arc<dyn ErasedHandler>)> {
        self.registrations
            .get(&type_id)
            .map(|r| (&r.entry, r.source.resolve()))
    }
}
