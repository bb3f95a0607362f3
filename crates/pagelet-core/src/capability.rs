//! Capabilities a pagelet kind is built from.
//!
//! The engine never looks inside these: it calls them at the points the
//! lifecycle defines and routes their results.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::RequestContext;

/// Data handed to templates and projected into client state.
pub type Data = Value;

/// Produces the data a pagelet renders.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch the data for one render cycle. Called at most once per cycle.
    async fn get(&self, ctx: &RequestContext) -> anyhow::Result<Data>;
}

/// Default data source: yields once, then resolves to an empty object.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyData;

#[async_trait]
impl DataSource for EmptyData {
    async fn get(&self, _ctx: &RequestContext) -> anyhow::Result<Data> {
        tokio::task::yield_now().await;
        Ok(Value::Object(Default::default()))
    }
}

/// Data source that always returns the same value.
#[derive(Debug, Clone)]
pub struct StaticData(pub Data);

#[async_trait]
impl DataSource for StaticData {
    async fn get(&self, _ctx: &RequestContext) -> anyhow::Result<Data> {
        Ok(self.0.clone())
    }
}

/// Server-side template. Evaluation is synchronous; failures are returned,
/// panics are captured by the render pipeline.
pub trait Template: Send + Sync {
    fn render(&self, data: &Data) -> anyhow::Result<String>;
}

/// Adapter turning a closure into a [`Template`].
pub struct FnTemplate<F>(F);

impl<F> Template for FnTemplate<F>
where
    F: Fn(&Data) -> anyhow::Result<String> + Send + Sync,
{
    fn render(&self, data: &Data) -> anyhow::Result<String> {
        (self.0)(data)
    }
}

/// Wrap a closure as a shared template.
pub fn template_fn<F>(f: F) -> Arc<dyn Template>
where
    F: Fn(&Data) -> anyhow::Result<String> + Send + Sync + 'static,
{
    Arc::new(FnTemplate(f))
}

/// Handles a `post` or `put` submitted over the substream.
#[async_trait]
pub trait FormHandler: Send + Sync {
    /// Process the submitted fields; the returned data is rendered back.
    async fn handle(&self, ctx: &RequestContext, fields: Data) -> anyhow::Result<Data>;
}

/// Receives `emit` events sent by the client.
pub trait EventListener: Send + Sync {
    fn on_event(&self, args: &[Data]);
}

/// One-shot continuation used to answer an RPC call.
///
/// Consumed on use, so a call is answered at most once.
pub struct Reply {
    send: Box<dyn FnOnce(Result<Vec<Data>, anyhow::Error>) + Send>,
}

impl Reply {
    pub fn new<F>(send: F) -> Self
    where
        F: FnOnce(Result<Vec<Data>, anyhow::Error>) + Send + 'static,
    {
        Self {
            send: Box::new(send),
        }
    }

    /// Answer with result values.
    pub fn ok(self, values: Vec<Data>) {
        (self.send)(Ok(values))
    }

    /// Answer with an error.
    pub fn err(self, error: anyhow::Error) {
        (self.send)(Err(error))
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply").finish_non_exhaustive()
    }
}

/// A method callable over the RPC substream.
#[async_trait]
pub trait RpcMethod: Send + Sync {
    /// Invoke the method. The reply continuation comes first, then the
    /// caller's arguments.
    async fn call(&self, ctx: &RequestContext, reply: Reply, args: Vec<Data>);
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_empty_data_resolves_to_object() {
        let ctx = RequestContext::get("/");
        let data = EmptyData.get(&ctx).await.unwrap();
        assert_eq!(data, json!({}));
    }

    #[tokio::test]
    async fn test_static_data() {
        let ctx = RequestContext::get("/");
        let data = StaticData(json!({"a": 1})).get(&ctx).await.unwrap();
        assert_eq!(data["a"], 1);
    }

    #[test]
    fn test_template_fn() {
        let t = template_fn(|d| Ok(format!("<b>{}</b>", d["name"].as_str().unwrap_or(""))));
        assert_eq!(t.render(&json!({"name": "x"})).unwrap(), "<b>x</b>");
    }

    #[test]
    fn test_reply_delivers_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reply = Reply::new(move |r| sink.lock().unwrap().push(r.is_ok()));

        reply.ok(vec![json!(1)]);
        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }
}
