//! Routing substream messages to a connected pagelet.

use futures::{Stream, StreamExt};
use pagelet_core::{Environment, Reply, RequestContext};
use pagelet_executor::{render, Pagelet, RenderOptions, Substream};

use crate::error::{Rejected, RpcError};
use crate::message::{CallId, Inbound, MessageKind, RpcMessage};

/// Authorize `pagelet` and open its substream on `outbound`.
///
/// The check runs without alternates. A rejected pagelet never gets the
/// channel: `outbound` is dropped and the destroyed pagelet comes back
/// inside [`Rejected`].
pub async fn connect(
    mut pagelet: Pagelet,
    req: RequestContext,
    outbound: Substream,
) -> Result<Connection, Rejected> {
    if !pagelet.resolve(&req, &[]).await.is_active() {
        tracing::debug!(pagelet = pagelet.name(), id = %pagelet.id(), "substream rejected");
        pagelet.destroy();
        return Err(Rejected::new(pagelet));
    }

    pagelet.attach_substream(outbound);
    tracing::debug!(pagelet = pagelet.name(), id = %pagelet.id(), "substream open");
    Ok(Connection {
        pagelet,
        req,
        env: Environment::from_env(),
    })
}

/// An open substream bound to one pagelet.
#[derive(Debug)]
pub struct Connection {
    pagelet: Pagelet,
    req: RequestContext,
    env: Environment,
}

impl Connection {
    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn pagelet(&self) -> &Pagelet {
        &self.pagelet
    }

    /// Dispatch frames until `inbound` ends, then tear the pagelet down.
    ///
    /// The destroyed pagelet is handed back so it can be returned to its pool.
    pub async fn run<St>(mut self, mut inbound: St) -> Pagelet
    where
        St: Stream<Item = String> + Unpin,
    {
        while let Some(frame) = inbound.next().await {
            self.dispatch_frame(&frame).await;
        }
        self.close()
    }

    /// Tear down: detach the substream and destroy the pagelet.
    pub fn close(mut self) -> Pagelet {
        tracing::debug!(pagelet = self.pagelet.name(), id = %self.pagelet.id(), "substream closed");
        self.pagelet.destroy();
        self.pagelet
    }

    /// Decode and dispatch one frame. Malformed frames are answered with an
    /// `err` message.
    pub async fn dispatch_frame(&mut self, frame: &str) {
        match RpcMessage::from_json(frame) {
            Ok(message) => self.dispatch(message).await,
            Err(err) => {
                tracing::warn!(pagelet = self.pagelet.name(), error = %err, "malformed frame");
                self.send(RpcMessage::err(None, &err));
            }
        }
    }

    pub async fn dispatch(&mut self, message: RpcMessage) {
        match message.classify() {
            Inbound::Call { id, method, args } => self.call(id, method, args).await,
            Inbound::Event { name, args } => self.emit(name, &args),
            Inbound::Render { id } => {
                let reply = match self.render(None).await {
                    Ok((markup, state)) => RpcMessage::fragment(id, markup, state),
                    Err(err) => RpcMessage::err(id, &err),
                };
                self.send(reply);
            }
            Inbound::Submit { verb, id, fields } => {
                let reply = match self.submit(verb, fields).await {
                    Ok((markup, state)) => RpcMessage::fragment(id, markup, state),
                    Err(err) => RpcMessage::err(id, &err),
                };
                self.send(reply);
            }
            Inbound::Unsupported { kind, id } => {
                self.send(RpcMessage::err(id, &RpcError::Unsupported(kind.to_string())));
            }
        }
    }

    async fn call(&mut self, id: Option<CallId>, method: Option<String>, args: Vec<serde_json::Value>) {
        let Some(method) = method else {
            self.send(reply_error(id, &RpcError::MissingMethod));
            return;
        };

        let kind = self.pagelet.kind().clone();
        if let Err(err) = kind.allowlist().check(&method) {
            tracing::warn!(pagelet = kind.name(), method = %method, "method not allowed");
            self.send(reply_error(id, &err.into()));
            return;
        }
        let Some(callable) = kind.method(&method) else {
            self.send(reply_error(id, &RpcError::UnknownMethod(method)));
            return;
        };

        tracing::debug!(pagelet = kind.name(), method = %method, "invoking method");
        let outbound = self.pagelet.substream().cloned();
        let reply = Reply::new(move |result| {
            let message = match result {
                Ok(values) => RpcMessage::reply_ok(id, values),
                Err(err) => reply_error(id, &RpcError::Handler(err)),
            };
            if let Some(outbound) = outbound {
                write(&outbound, &message);
            }
        });
        callable.call(&self.req, reply, args).await;
    }

    fn emit(&self, name: Option<String>, args: &[serde_json::Value]) {
        let kind = self.pagelet.kind();
        match name.as_deref().and_then(|n| kind.listener(n)) {
            Some(listener) => listener.on_event(args),
            None => tracing::debug!(pagelet = kind.name(), event = ?name, "no listener for event"),
        }
    }

    async fn render(&mut self, data: Option<serde_json::Value>) -> Result<(String, serde_json::Value), RpcError> {
        let mut options = RenderOptions::new(self.pagelet.kind().config().mode)
            .with_env(self.env)
            .substream();
        if let Some(data) = data {
            options = options.with_data(data);
        }
        let fragment = render(&mut self.pagelet, &self.req, &options).await?;
        Ok((fragment.markup, fragment.state))
    }

    async fn submit(
        &mut self,
        verb: MessageKind,
        fields: serde_json::Value,
    ) -> Result<(String, serde_json::Value), RpcError> {
        let kind = self.pagelet.kind().clone();
        let handler = match verb {
            MessageKind::Put => kind.put(),
            _ => kind.post(),
        };
        let Some(handler) = handler else {
            return Err(RpcError::MissingHandler {
                pagelet: kind.name().to_string(),
                verb: verb.as_str(),
            });
        };

        let data = handler.handle(&self.req, fields).await.map_err(RpcError::Handler)?;
        self.render(Some(data)).await
    }

    fn send(&self, message: RpcMessage) {
        match self.pagelet.substream() {
            Some(outbound) => write(outbound, &message),
            None => tracing::debug!(pagelet = self.pagelet.name(), "substream detached, dropping reply"),
        }
    }
}

fn reply_error(id: Option<CallId>, err: &RpcError) -> RpcMessage {
    RpcMessage::reply_err(id, err.name(), &err.to_string())
}

fn write(outbound: &Substream, message: &RpcMessage) {
    if outbound.unbounded_send(message.to_json()).is_err() {
        tracing::debug!(kind = %message.kind, "peer gone, dropping message");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use futures::channel::mpsc;
    use pagelet_core::{template_fn, Data, EventListener, FormHandler, RpcMethod, StaticData};
    use pagelet_executor::{InstancePool, PageletKind, PageletKindBuilder, PageletTree};
    use pagelet_security::Condition;
    use serde_json::{json, Value};

    use super::*;

    struct Echo(Arc<AtomicUsize>);

    #[async_trait]
    impl RpcMethod for Echo {
        async fn call(&self, _ctx: &RequestContext, reply: Reply, args: Vec<Data>) {
            self.0.fetch_add(1, Ordering::SeqCst);
            reply.ok(args);
        }
    }

    struct Refuse;

    #[async_trait]
    impl RpcMethod for Refuse {
        async fn call(&self, _ctx: &RequestContext, reply: Reply, _args: Vec<Data>) {
            reply.err(anyhow::anyhow!("out of stock"));
        }
    }

    struct Recorder(Arc<Mutex<Vec<Value>>>);

    impl EventListener for Recorder {
        fn on_event(&self, args: &[Data]) {
            self.0.lock().unwrap().extend_from_slice(args);
        }
    }

    struct AddItem;

    #[async_trait]
    impl FormHandler for AddItem {
        async fn handle(&self, _ctx: &RequestContext, fields: Data) -> anyhow::Result<Data> {
            Ok(json!({"count": fields["qty"].as_u64().unwrap_or(0) + 1}))
        }
    }

    fn cart() -> PageletKindBuilder {
        PageletKind::builder("cart")
            .with_view(template_fn(|d| Ok(format!("<cart>{}</cart>", d["count"]))))
            .with_data(StaticData(json!({"count": 1})))
            .configure(|c| c.with_query(&["count"]).with_rpc(&["add", "refuse", "missing"]))
    }

    async fn open(kind: PageletKind) -> (Connection, mpsc::UnboundedReceiver<String>) {
        let tree = PageletTree::compose(kind).unwrap();
        let pagelet = InstancePool::new(1).acquire(&tree, tree.root());
        let (tx, rx) = mpsc::unbounded();
        let conn = connect(pagelet, RequestContext::get("/cart"), tx).await.unwrap();
        (conn.with_env(Environment::Test), rx)
    }

    fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
        let frame = rx.try_next().unwrap().unwrap();
        serde_json::from_str(&frame).unwrap()
    }

    // === connect Tests ===

    #[tokio::test]
    async fn test_rejected_connect_never_opens() {
        let kind = cart().with_condition(Condition::always(false)).build().unwrap();
        let tree = PageletTree::compose(kind).unwrap();
        let pagelet = InstancePool::new(1).acquire(&tree, tree.root());
        let (tx, mut rx) = mpsc::unbounded();

        let rejected = connect(pagelet, RequestContext::get("/"), tx).await.unwrap_err();

        assert_eq!(rejected.name(), "cart");
        assert_eq!(rejected.to_string(), "pagelet 'cart' rejected the substream");
        assert!(matches!(RpcError::from(rejected), RpcError::Unauthorized(name) if name == "cart"));
        assert_eq!(rx.next().await, None);
    }

    #[tokio::test]
    async fn test_rejected_pagelet_returns_to_pool() {
        let kind = cart().with_condition(Condition::always(false)).build().unwrap();
        let tree = PageletTree::compose(kind).unwrap();
        let pool = InstancePool::new(1);
        let (tx, _rx) = mpsc::unbounded();

        let rejected = connect(pool.acquire(&tree, tree.root()), RequestContext::get("/"), tx)
            .await
            .unwrap_err();
        let pagelet = rejected.into_pagelet();
        assert!(pagelet.is_released());
        assert!(pagelet.substream().is_none());
        pool.release(pagelet);

        let stats = pool.stats();
        assert_eq!(stats.released, 1);
        pool.acquire(&tree, tree.root());
        assert_eq!(pool.stats().reused, 1);
    }

    // === rpc Tests ===

    #[tokio::test]
    async fn test_allowed_method_replies_with_correlated_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (mut conn, mut rx) = open(cart().with_method("add", Echo(calls.clone())).build().unwrap()).await;

        conn.dispatch(RpcMessage::call(4u64, "add", vec![json!("sku-1")])).await;

        assert_eq!(next(&mut rx), json!({"type": "rpc", "id": 4, "args": [null, "sku-1"]}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disallowed_method_is_not_invoked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (mut conn, mut rx) = open(cart().with_method("foo", Echo(calls.clone())).build().unwrap()).await;

        conn.dispatch_frame(r#"{"type":"rpc","method":"foo","id":7}"#).await;

        let reply = next(&mut rx);
        assert_eq!(reply["type"], "rpc");
        assert_eq!(reply["id"], 7);
        assert_eq!(reply["args"][0]["name"], "MethodNotAllowed");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_allowed_but_unexposed_method() {
        let (mut conn, mut rx) = open(cart().build().unwrap()).await;

        conn.dispatch(RpcMessage::call("x", "missing", Vec::new())).await;

        let reply = next(&mut rx);
        assert_eq!(reply["id"], "x");
        assert_eq!(reply["args"][0]["name"], "UnknownMethod");
    }

    #[tokio::test]
    async fn test_method_error_reply() {
        let (mut conn, mut rx) = open(cart().with_method("refuse", Refuse).build().unwrap()).await;

        conn.dispatch(RpcMessage::call(1u64, "refuse", Vec::new())).await;

        assert_eq!(
            next(&mut rx),
            json!({"type": "rpc", "id": 1, "args": [{"name": "Error", "message": "out of stock"}]})
        );
    }

    // === emit / get / post Tests ===

    #[tokio::test]
    async fn test_emit_reaches_listener_without_reply() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (mut conn, mut rx) = open(cart().with_listener("viewed", Recorder(seen.clone())).build().unwrap()).await;

        conn.dispatch(RpcMessage::new(MessageKind::Emit).with_method("viewed").with_args(vec![json!(3)]))
            .await;
        conn.dispatch(RpcMessage::new(MessageKind::Emit).with_method("unknown")).await;

        assert_eq!(*seen.lock().unwrap(), vec![json!(3)]);
        assert!(rx.try_next().is_err());
    }

    #[tokio::test]
    async fn test_get_replies_with_view_and_state() {
        let (mut conn, mut rx) = open(cart().build().unwrap()).await;

        conn.dispatch(RpcMessage::new(MessageKind::Get).with_id(2u64)).await;

        assert_eq!(
            next(&mut rx),
            json!({"type": "fragment", "id": 2, "args": ["<cart>1</cart>", {"count": 1}]})
        );
    }

    #[tokio::test]
    async fn test_post_without_handler_errors() {
        let (mut conn, mut rx) = open(cart().build().unwrap()).await;

        conn.dispatch(RpcMessage::new(MessageKind::Post).with_id(5u64)).await;

        let reply = next(&mut rx);
        assert_eq!(reply["type"], "err");
        assert_eq!(reply["id"], 5);
        assert_eq!(reply["args"][0]["name"], "MissingHandler");
    }

    #[tokio::test]
    async fn test_put_renders_handler_result() {
        let (mut conn, mut rx) = open(cart().with_put(AddItem).build().unwrap()).await;

        conn.dispatch(
            RpcMessage::new(MessageKind::Put)
                .with_id(6u64)
                .with_args(vec![json!({"qty": 2})]),
        )
        .await;

        assert_eq!(
            next(&mut rx),
            json!({"type": "fragment", "id": 6, "args": ["<cart>3</cart>", {"count": 3}]})
        );
    }

    // === Channel Tests ===

    #[tokio::test]
    async fn test_malformed_frame_keeps_channel_open() {
        let (mut conn, mut rx) = open(cart().build().unwrap()).await;

        conn.dispatch_frame("not json").await;
        conn.dispatch_frame(r#"{"type":"fragment","id":9}"#).await;

        assert_eq!(next(&mut rx)["args"][0]["name"], "MalformedFrame");
        let unsupported = next(&mut rx);
        assert_eq!(unsupported["id"], 9);
        assert_eq!(unsupported["args"][0]["name"], "UnsupportedMessage");
    }

    #[tokio::test]
    async fn test_run_tears_down_when_inbound_ends() {
        let (conn, mut rx) = open(cart().build().unwrap()).await;
        let inbound = futures::stream::iter(vec![r#"{"type":"get","id":1}"#.to_string()]);

        let pagelet = conn.run(inbound).await;

        assert!(pagelet.is_released());
        assert!(pagelet.substream().is_none());
        assert_eq!(next(&mut rx)["type"], "fragment");
        assert_eq!(rx.next().await, None);
    }
}
