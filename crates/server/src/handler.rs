use std::future::Future;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::BoxError;

/// A registered endpoint capability.
///
/// A handler receives the per-connection [`RequestContext`] and typically
/// finishes by calling one of its respond methods. The dispatcher consumes
/// no return value beyond the error case: an `Err` is contained there and
/// becomes a 500 response whose reason phrase is the error's display text.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: &mut RequestContext) -> Result<(), BoxError>;
}

/// The function shape accepted by [`handler_fn`].
///
/// Spelled as its own trait so the returned future may borrow the context;
/// plain async functions of the form
/// `async fn(&mut RequestContext) -> Result<(), BoxError>` satisfy it.
pub trait HandlerFunc<'ctx>: Send + Sync {
    type Fut: Future<Output = Result<(), BoxError>> + Send + 'ctx;

    fn invoke(&self, ctx: &'ctx mut RequestContext) -> Self::Fut;
}

impl<'ctx, F, Fut> HandlerFunc<'ctx> for F
where
    F: Fn(&'ctx mut RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'ctx,
{
    type Fut = Fut;

    fn invoke(&self, ctx: &'ctx mut RequestContext) -> Self::Fut {
        self(ctx)
    }
}

/// Adapter turning an async function into a [`Handler`].
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: for<'ctx> HandlerFunc<'ctx>,
{
    async fn call(&self, ctx: &mut RequestContext) -> Result<(), BoxError> {
        self.f.invoke(ctx).await
    }
}

pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'ctx> HandlerFunc<'ctx>,
{
    HandlerFn { f }
}
