//! The ordered, one-shot-wired registry of protocol handlers.
//!
//! A [`ChainBuilder`] accumulates connect handlers, command handlers, and
//! hooks in registration order. [`ChainBuilder::wire`] performs the single
//! wiring pass: every extensible handler is handed the ordered provider
//! list for the hook types it consumes, verbs are checked for duplicates,
//! and the result is a frozen [`HandlerChain`] that requires no locking.
//! The builder is consumed by `wire`, so late registration is impossible.

use std::any::{Any, TypeId, type_name};
use std::sync::Arc;

use ahash::AHashMap;

use crate::{
    error::WiringError,
    handler::{CommandHandler, ConnectHandler},
};

/// Hook providers, stored per hook type in registration order.
///
/// Hook types are capabilities: any `dyn Trait` can be registered, and a
/// handler asks for the ordered list of providers of the one capability it
/// cares about.
#[derive(Default)]
pub struct HookRegistry {
    entries: AHashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl HookRegistry {
    pub fn register<H>(&mut self, hook: Arc<H>)
    where
        H: ?Sized + Send + Sync + 'static,
    {
        let entry = self
            .entries
            .entry(TypeId::of::<H>())
            .or_insert_with(|| Box::new(Vec::<Arc<H>>::new()));

        match entry.downcast_mut::<Vec<Arc<H>>>() {
            Some(providers) => providers.push(hook),
            None => unreachable!("hook providers are keyed by their own TypeId"),
        }
    }

    /// The registered providers of `H`, in registration order.
    #[must_use]
    pub fn of<H>(&self) -> Vec<Arc<H>>
    where
        H: ?Sized + Send + Sync + 'static,
    {
        self.entries
            .get(&TypeId::of::<H>())
            .and_then(|entry| entry.downcast_ref::<Vec<Arc<H>>>())
            .cloned()
            .unwrap_or_default()
    }

    /// Like [`HookRegistry::of`], but wiring fails unless at least one
    /// provider is registered.
    ///
    /// For handlers that are meaningless without a provider, such as
    /// LMTP delivery.
    pub fn require<H>(&self, verb: &'static str) -> Result<Vec<Arc<H>>, WiringError>
    where
        H: ?Sized + Send + Sync + 'static,
    {
        let providers = self.of::<H>();

        if providers.is_empty() {
            return Err(WiringError::UnresolvedHook {
                verb,
                hook: Self::name_of::<H>(),
            });
        }

        Ok(providers)
    }

    #[must_use]
    pub fn count<H>(&self) -> usize
    where
        H: ?Sized + Send + Sync + 'static,
    {
        self.entries
            .get(&TypeId::of::<H>())
            .and_then(|entry| entry.downcast_ref::<Vec<Arc<H>>>())
            .map_or(0, Vec::len)
    }

    /// The unqualified name of a hook type, for wiring diagnostics.
    #[must_use]
    pub fn name_of<H: ?Sized>() -> &'static str {
        type_name::<H>().rsplit("::").next().unwrap_or("hook")
    }
}

/// Accumulates handlers and hooks before the wiring pass.
#[derive(Default)]
pub struct ChainBuilder {
    connect: Vec<Arc<dyn ConnectHandler>>,
    commands: Vec<Box<dyn CommandHandler>>,
    unknown: Option<Box<dyn CommandHandler>>,
    hooks: HookRegistry,
}

impl ChainBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn connect(mut self, handler: impl ConnectHandler + 'static) -> Self {
        self.connect.push(Arc::new(handler));
        self
    }

    #[must_use]
    pub fn command(mut self, handler: impl CommandHandler + 'static) -> Self {
        self.commands.push(Box::new(handler));
        self
    }

    /// The handler that receives every verb with no registered handler.
    #[must_use]
    pub fn unknown(mut self, handler: impl CommandHandler + 'static) -> Self {
        self.unknown = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn hook<H>(mut self, hook: Arc<H>) -> Self
    where
        H: ?Sized + Send + Sync + 'static,
    {
        self.hooks.register(hook);
        self
    }

    /// The one-shot wiring pass.
    ///
    /// Consumes the builder, so adding handlers after wiring is rejected at
    /// compile time rather than at run time.
    pub fn wire(mut self) -> Result<HandlerChain, WiringError> {
        let mut unknown = self.unknown.ok_or(WiringError::MissingUnknownHandler)?;

        for command in &mut self.commands {
            if let Some(extensible) = command.as_extensible() {
                extensible.wire(&self.hooks)?;
            }
        }
        if let Some(extensible) = unknown.as_extensible() {
            extensible.wire(&self.hooks)?;
        }

        let mut commands: AHashMap<String, Arc<dyn CommandHandler>> = AHashMap::new();
        for command in self.commands {
            let command: Arc<dyn CommandHandler> = Arc::from(command);
            for verb in command.verbs() {
                let verb = verb.to_ascii_uppercase();
                if commands.insert(verb.clone(), Arc::clone(&command)).is_some() {
                    return Err(WiringError::DuplicateVerb(verb));
                }
            }
        }

        Ok(HandlerChain {
            connect: self.connect,
            commands,
            unknown: Arc::from(unknown),
        })
    }
}

/// The frozen handler registry consulted per connection.
pub struct HandlerChain {
    connect: Vec<Arc<dyn ConnectHandler>>,
    commands: AHashMap<String, Arc<dyn CommandHandler>>,
    unknown: Arc<dyn CommandHandler>,
}

impl HandlerChain {
    #[must_use]
    pub fn connect_handlers(&self) -> &[Arc<dyn ConnectHandler>] {
        &self.connect
    }

    /// The handler for a verb, falling back to the unknown-command handler.
    #[must_use]
    pub fn command(&self, verb: &str) -> &Arc<dyn CommandHandler> {
        self.commands.get(verb).unwrap_or(&self.unknown)
    }

    #[must_use]
    pub fn has_verb(&self, verb: &str) -> bool {
        self.commands.contains_key(verb)
    }
}
