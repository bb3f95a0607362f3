//! Serving a composed tree in its dispatch mode.

use std::fmt::Display;

use futures::future::{join_all, BoxFuture};
use futures::stream::FuturesUnordered;
use futures::{FutureExt, Sink, StreamExt};
use http::StatusCode;
use pagelet_codec::{encode, Envelope};
use pagelet_core::{PageletError, PageletId, RenderMode, RequestContext, TimingContext};
use pagelet_streaming::{FragmentSink, Shell};

use crate::config::EngineConfig;
use crate::discovery::discover;
use crate::fallback::{failure_envelope, failure_markup};
use crate::ordering::ReorderBuffer;
use crate::pagelet::Pagelet;
use crate::pipeline::{render, Fragment, RenderOptions};
use crate::pool::InstancePool;
use crate::tree::PageletTree;

/// Summary of one served response.
#[derive(Debug, Clone)]
pub struct ServeReport {
    pub mode: RenderMode,
    pub status: StatusCode,
    /// Names of the fragments written after the shell, in write order.
    /// Sync responses write a single document and list none.
    pub fragments: Vec<String>,
    pub closed: bool,
    pub timing: TimingContext,
}

/// Drives discovery and rendering for whole responses.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    pool: InstancePool,
    shell: Shell,
}

/// A rendered pagelet together with its discovered children.
struct Branch {
    pagelet: Pagelet,
    rendered: Result<Fragment, PageletError>,
    children: Vec<Pagelet>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            pool: InstancePool::new(config.pool_capacity),
            config,
            shell: Shell::default(),
        }
    }

    pub fn with_shell(mut self, shell: Shell) -> Self {
        self.shell = shell;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &InstancePool {
        &self.pool
    }

    /// Serve `tree` for `req` into `sink`, in the root kind's mode.
    ///
    /// The sink is closed once every dispatched fragment has been written.
    /// Render failures degrade single fragments; only sink errors fail the
    /// whole response.
    pub async fn serve<S>(
        &self,
        tree: &PageletTree,
        req: &RequestContext,
        sink: S,
    ) -> Result<ServeReport, PageletError>
    where
        S: Sink<Vec<u8>> + Unpin,
        S::Error: Display,
    {
        let root = tree.node(tree.root()).kind();
        let mode = root.config().mode;
        let mut sink = FragmentSink::new(sink, self.config.flush);
        tracing::info!(pagelet = root.name(), request = %req.request_id, mode = %mode, "serving");

        match mode {
            RenderMode::Sync => self.serve_sync(tree, req, &mut sink).await?,
            RenderMode::AsyncStream | RenderMode::OrderedStream => {
                self.serve_streaming(tree, req, &mut sink, mode).await?
            }
        }

        let report = ServeReport {
            mode,
            status: root.config().status(),
            fragments: sink.fragments_sent().to_vec(),
            closed: sink.is_closed(),
            timing: sink.timing().clone(),
        };
        tracing::info!(
            pagelet = root.name(),
            request = %req.request_id,
            fragments = report.fragments.len(),
            elapsed_ms = report.timing.elapsed().as_millis() as u64,
            "response closed"
        );
        Ok(report)
    }

    async fn serve_sync<S>(
        &self,
        tree: &PageletTree,
        req: &RequestContext,
        sink: &mut FragmentSink<S>,
    ) -> Result<(), PageletError>
    where
        S: Sink<Vec<u8>> + Unpin,
        S::Error: Display,
    {
        let mut root = self.pool.acquire(tree, tree.root());
        let markup = self.render_subtree(tree, &mut root, req).await;
        self.pool.release(root);

        sink.send_shell(&self.shell.wrap(&markup)).await?;
        sink.end("").await?;
        Ok(())
    }

    /// Render children first, then the pagelet with their markup embedded.
    fn render_subtree<'a>(
        &'a self,
        tree: &'a PageletTree,
        pagelet: &'a mut Pagelet,
        req: &'a RequestContext,
    ) -> BoxFuture<'a, String> {
        async move {
            if pagelet.resolve(req, &[]).await.is_active() {
                discover(tree, pagelet.node(), &self.pool, req)
                    .await
                    .attach(pagelet);
            }

            let embedded = join_all(pagelet.children_mut().map(move |child| async move {
                let name = child.name().to_string();
                (name, self.render_subtree(tree, child, req).await)
            }))
            .await;

            let options = RenderOptions::new(RenderMode::Sync)
                .with_env(self.config.env)
                .with_embedded(embedded);
            match render(pagelet, req, &options).await {
                Ok(fragment) => fragment.markup,
                Err(err) => {
                    tracing::error!(pagelet = pagelet.name(), id = %pagelet.id(), error = %err, "render failed without error view");
                    failure_markup(pagelet.name(), &err, self.config.env)
                }
            }
        }
        .boxed()
    }

    async fn serve_streaming<S>(
        &self,
        tree: &PageletTree,
        req: &RequestContext,
        sink: &mut FragmentSink<S>,
        mode: RenderMode,
    ) -> Result<(), PageletError>
    where
        S: Sink<Vec<u8>> + Unpin,
        S::Error: Display,
    {
        let options = RenderOptions::new(mode).with_env(self.config.env);
        let ordered = mode == RenderMode::OrderedStream;

        // The shell goes out before any data is fetched.
        sink.send_shell(&self.shell.render_opening()).await?;

        let Branch {
            pagelet: root,
            rendered,
            children,
        } = self.render_branch(tree, req, self.pool.acquire(tree, tree.root()), &options).await;
        let root_markup = match rendered {
            Ok(fragment) => fragment.markup,
            Err(err) => {
                tracing::error!(pagelet = root.name(), id = %root.id(), error = %err, "render failed without error view");
                failure_markup(root.name(), &err, options.env)
            }
        };
        self.pool.release(root);
        sink.send_raw(root_markup.into_bytes()).await?;

        let mut order = ReorderBuffer::new();
        let mut in_flight = FuturesUnordered::new();
        for child in children {
            sink.expect(1);
            if ordered {
                order.reserve(child.id());
            }
            in_flight.push(self.render_branch(tree, req, child, &options));
        }

        while let Some(branch) = in_flight.next().await {
            let Branch {
                pagelet,
                rendered,
                children,
            } = branch;

            let child_ids: Vec<PageletId> = children.iter().map(Pagelet::id).collect();
            for child in children {
                sink.expect(1);
                in_flight.push(self.render_branch(tree, req, child, &options));
            }

            let name = pagelet.name().to_string();
            let envelope = match rendered {
                Ok(fragment) => fragment
                    .envelope
                    .unwrap_or_else(|| encode(&fragment.meta, &fragment.markup, &fragment.state)),
                Err(err) => failure_envelope(&pagelet.fragment_meta(), &err, options.env),
            };
            if ordered {
                order.complete(pagelet.id(), (name, envelope), &child_ids);
                for (name, envelope) in order.drain_ready() {
                    write_envelope(sink, &name, envelope).await?;
                }
            } else {
                write_envelope(sink, &name, envelope).await?;
            }
            self.pool.release(pagelet);
        }

        if !sink.end(&self.shell.render_closing()).await? {
            return Err(PageletError::Stream(format!(
                "{} fragments still outstanding at close",
                sink.outstanding()
            )));
        }
        Ok(())
    }

    /// Render one pagelet, then discover its children if it is active.
    async fn render_branch(
        &self,
        tree: &PageletTree,
        req: &RequestContext,
        mut pagelet: Pagelet,
        options: &RenderOptions,
    ) -> Branch {
        let rendered = render(&mut pagelet, req, options).await;

        let children = if pagelet.is_active() {
            discover(tree, pagelet.node(), &self.pool, req)
                .await
                .attach(&mut pagelet);
            pagelet.take_children()
        } else {
            Vec::new()
        };

        Branch {
            pagelet,
            rendered,
            children,
        }
    }
}

/// Stamp the outstanding count, this fragment included, and write it.
async fn write_envelope<S>(
    sink: &mut FragmentSink<S>,
    name: &str,
    mut envelope: Envelope,
) -> Result<(), PageletError>
where
    S: Sink<Vec<u8>> + Unpin,
    S::Error: Display,
{
    envelope.remaining = sink.outstanding();
    sink.send_fragment(name, &envelope.to_html()).await
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::channel::mpsc;
    use pagelet_core::{template_fn, Data, DataSource, Environment};
    use pagelet_security::Condition;
    use pagelet_streaming::FlushPolicy;
    use serde_json::json;

    use super::*;
    use crate::kind::{PageletKind, PageletKindBuilder};

    struct Delayed {
        ms: u64,
        label: &'static str,
    }

    #[async_trait]
    impl DataSource for Delayed {
        async fn get(&self, _ctx: &RequestContext) -> anyhow::Result<Data> {
            tokio::time::sleep(Duration::from_millis(self.ms)).await;
            Ok(json!({"label": self.label}))
        }
    }

    fn labelled(name: &str) -> PageletKindBuilder {
        PageletKind::builder(name).with_view(template_fn(|d| {
            Ok(format!("[{}]", d["label"].as_str().unwrap_or("")))
        }))
    }

    fn delayed(name: &'static str, ms: u64) -> PageletKind {
        labelled(name)
            .with_data(Delayed { ms, label: name })
            .build()
            .unwrap()
    }

    fn engine() -> Engine {
        Engine::new(
            EngineConfig::default()
                .with_env(Environment::Test)
                .with_flush(FlushPolicy::AfterEachFragment),
        )
        .with_shell(Shell::bare())
    }

    async fn serve(tree: &PageletTree) -> (ServeReport, Vec<String>) {
        let (tx, rx) = mpsc::unbounded();
        let report = engine().serve(tree, &RequestContext::get("/"), tx).await.unwrap();
        let chunks = rx.map(|b| String::from_utf8(b).unwrap()).collect().await;
        (report, chunks)
    }

    fn root(mode: RenderMode, children: Vec<PageletKind>) -> PageletTree {
        let kind = children
            .into_iter()
            .fold(
                PageletKind::builder("page")
                    .with_view(template_fn(|d| {
                        Ok(format!(
                            "<page>{}{}</page>",
                            d["a"].as_str().unwrap_or(""),
                            d["b"].as_str().unwrap_or("")
                        ))
                    }))
                    .configure(|c| c.with_mode(mode)),
                |b, k| b.with_child(k),
            )
            .build()
            .unwrap();
        PageletTree::compose(kind).unwrap()
    }

    // === Sync Tests ===

    #[tokio::test]
    async fn test_sync_embeds_children_in_one_write() {
        let hidden = labelled("b")
            .with_condition(Condition::always(false))
            .build()
            .unwrap();
        let tree = root(RenderMode::Sync, vec![delayed("a", 0), hidden]);

        let (report, chunks) = serve(&tree).await;

        assert_eq!(chunks, vec!["<page>[a]</page>"]);
        assert!(report.closed);
        assert!(report.fragments.is_empty());
        assert_eq!(report.mode, RenderMode::Sync);
    }

    // === AsyncStream Tests ===

    #[tokio::test(start_paused = true)]
    async fn test_async_writes_in_completion_order() {
        let tree = root(
            RenderMode::AsyncStream,
            vec![delayed("slow", 30), delayed("fast", 10), delayed("mid", 20)],
        );

        let (report, chunks) = serve(&tree).await;

        assert_eq!(report.fragments, vec!["fast", "mid", "slow"]);
        assert!(report.closed);
        assert_eq!(chunks.len(), 4);
        assert!(chunks[0].starts_with("<page>"));
        assert!(chunks[1].contains(r#"data-pagelet="fast""#));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shell_precedes_root_data() {
        let kind = labelled("page")
            .with_data(Delayed { ms: 50, label: "page" })
            .configure(|c| c.with_mode(RenderMode::AsyncStream))
            .build()
            .unwrap();
        let tree = PageletTree::compose(kind).unwrap();
        let engine = Engine::new(EngineConfig::default().with_env(Environment::Test));
        let (tx, mut rx) = mpsc::unbounded::<Vec<u8>>();

        let ctx = RequestContext::get("/");
        let (report, (opening, nothing_else)) = tokio::join!(
            engine.serve(&tree, &ctx, tx),
            async {
                tokio::time::sleep(Duration::from_millis(1)).await;
                let opening = rx.try_next().unwrap().unwrap();
                (String::from_utf8(opening).unwrap(), rx.try_next().is_err())
            }
        );

        assert!(opening.starts_with("<!DOCTYPE html>"));
        assert!(!opening.contains("[page]"));
        assert!(nothing_else);
        assert!(report.unwrap().closed);

        let rest: Vec<String> = rx.map(|b| String::from_utf8(b).unwrap()).collect().await;
        assert_eq!(rest, vec!["[page]".to_string(), "</body>\n</html>".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_envelopes_count_down_remaining() {
        let tree = root(
            RenderMode::AsyncStream,
            vec![delayed("slow", 30), delayed("fast", 10), delayed("mid", 20)],
        );

        let (report, chunks) = serve(&tree).await;

        assert!(chunks[1].contains(r#""remaining":3"#));
        assert!(chunks[2].contains(r#""remaining":2"#));
        assert!(chunks[3].contains(r#""remaining":1"#));
        let after: Vec<usize> = report.timing.fragments().map(|f| f.remaining).collect();
        assert_eq!(after, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn test_child_envelope_carries_declared_mode() {
        let clock = labelled("clock")
            .with_data(Delayed { ms: 0, label: "clock" })
            .configure(|c| c.with_mode(RenderMode::Sync))
            .build()
            .unwrap();
        let tree = root(RenderMode::AsyncStream, vec![clock]);

        let (report, chunks) = serve(&tree).await;

        assert_eq!(report.mode, RenderMode::AsyncStream);
        assert!(chunks[1].contains(r#""mode":"sync""#));
        assert!(!chunks[1].contains(r#""mode":"async""#));
    }

    #[tokio::test]
    async fn test_failed_child_degrades_to_failure_fragment() {
        let broken = PageletKind::builder("a")
            .with_view(template_fn(|_| anyhow::bail!("bad template")))
            .build()
            .unwrap();
        let tree = root(RenderMode::AsyncStream, vec![broken, delayed("b", 0)]);

        let (report, chunks) = serve(&tree).await;

        assert_eq!(report.fragments.len(), 2);
        assert!(chunks.iter().any(|c| c.contains("pagelet-error")));
        assert!(report.closed);
    }

    // === OrderedStream Tests ===

    #[tokio::test(start_paused = true)]
    async fn test_ordered_writes_in_declaration_order() {
        let nested = labelled("first")
            .with_data(Delayed { ms: 30, label: "first" })
            .with_child(delayed("inner", 5))
            .build()
            .unwrap();
        let tree = root(
            RenderMode::OrderedStream,
            vec![nested, delayed("second", 10)],
        );

        let (report, _chunks) = serve(&tree).await;

        assert_eq!(report.fragments, vec!["first", "inner", "second"]);
        assert!(report.closed);
    }

    // === Pool Tests ===

    #[tokio::test]
    async fn test_serve_returns_instances_to_pool() {
        let tree = root(RenderMode::AsyncStream, vec![delayed("a", 0)]);
        let engine = engine();

        for _ in 0..2 {
            let (tx, _rx) = mpsc::unbounded();
            engine.serve(&tree, &RequestContext::get("/"), tx).await.unwrap();
        }

        let stats = engine.pool().stats();
        assert_eq!(stats.acquired, 4);
        assert_eq!(stats.released, 4);
        assert_eq!(stats.reused, 2);
    }
}
