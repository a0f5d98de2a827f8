//! Task resolvers: the caller-supplied work behind `Task` states.
//!
//! Follows the blanket-impl pattern used for other async traits:
//! 1. `TaskResolver` uses native async fn in traits (RPITIT)
//! 2. `TaskResolverDyn` is the object-safe form with boxed futures
//! 3. Every `TaskResolver` implements `TaskResolverDyn` automatically
//!
//! `ResolverRegistry` stores resolvers as `Arc<dyn TaskResolverDyn>` keyed by
//! resource name.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use statelang_types::error::TaskError;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Performs the work of a Task state.
///
/// Receives the state's effective input and returns the raw result, or a
/// [`TaskError`] whose `error` name is matched against `Retry` / `Catch`.
pub trait TaskResolver: Send + Sync {
    fn invoke(&self, input: Value) -> impl Future<Output = Result<Value, TaskError>> + Send;
}

/// Object-safe version of [`TaskResolver`].
pub trait TaskResolverDyn: Send + Sync {
    fn invoke_boxed(&self, input: Value) -> BoxFuture<'_, Result<Value, TaskError>>;
}

impl<T: TaskResolver> TaskResolverDyn for T {
    fn invoke_boxed(&self, input: Value) -> BoxFuture<'_, Result<Value, TaskError>> {
        Box::pin(self.invoke(input))
    }
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

/// Adapts an async closure `Fn(Value) -> Future<Output = Result<Value, TaskError>>`.
pub struct FnResolver<F>(pub F);

impl<F, Fut> TaskResolver for FnResolver<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, TaskError>> + Send,
{
    fn invoke(&self, input: Value) -> impl Future<Output = Result<Value, TaskError>> + Send {
        (self.0)(input)
    }
}

/// Always returns the same document. Used for stubbing resources.
#[derive(Debug, Clone)]
pub struct StaticResolver(pub Value);

impl TaskResolver for StaticResolver {
    async fn invoke(&self, _input: Value) -> Result<Value, TaskError> {
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// ResolverRegistry
// ---------------------------------------------------------------------------

/// Resolvers keyed by resource (or state) name.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, Arc<dyn TaskResolverDyn>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resolver` under `name`, replacing any previous entry.
    pub fn register<R: TaskResolver + 'static>(&mut self, name: impl Into<String>, resolver: R) -> &mut Self {
        let name = name.into();
        tracing::debug!(resource = name.as_str(), "registered task resolver");
        self.resolvers.insert(name, Arc::new(resolver));
        self
    }

    /// Register an async closure.
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, TaskError>> + Send + 'static,
    {
        self.register(name, FnResolver(f))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskResolverDyn>> {
        self.resolvers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.resolvers.keys().collect();
        names.sort();
        f.debug_struct("ResolverRegistry")
            .field("resolvers", &names)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
