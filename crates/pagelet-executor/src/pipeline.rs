//! Render pipeline: activation, data, template, state, envelope.

use std::panic::{self, AssertUnwindSafe};

use pagelet_codec::{encode, Envelope, FragmentMeta};
use pagelet_core::{Data, Environment, PageletError, RenderMode, RequestContext, Template};
use serde_json::{json, Map, Value};

use crate::pagelet::Pagelet;

/// Knobs of one render cycle.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub mode: RenderMode,
    pub env: Environment,
    /// Candidates that would replace this pagelet if it is rejected.
    pub alternates: Vec<String>,
    /// Return the raw view/state pair instead of an encoded envelope.
    pub substream: bool,
    /// Use this data instead of calling the data source.
    pub data: Option<Data>,
    /// Child markup inserted into the data under each child's name.
    pub embedded: Vec<(String, String)>,
}

impl RenderOptions {
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn with_alternates(mut self, alternates: Vec<String>) -> Self {
        self.alternates = alternates;
        self
    }

    pub fn substream(mut self) -> Self {
        self.substream = true;
        self
    }

    pub fn with_data(mut self, data: Data) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_embedded(mut self, embedded: Vec<(String, String)>) -> Self {
        self.embedded = embedded;
        self
    }

    fn encodes(&self) -> bool {
        !self.substream && self.mode != RenderMode::Sync
    }
}

/// Output of one render cycle.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub meta: FragmentMeta,
    pub active: bool,
    /// View output; empty for an inactive pagelet.
    pub markup: String,
    /// Projected client state, before escaping.
    pub state: Value,
    /// Encoded form; absent in sync mode and on substreams.
    pub envelope: Option<Envelope>,
}

impl Fragment {
    /// What goes on the wire: the envelope template if encoded, the raw
    /// markup otherwise.
    pub fn to_html(&self) -> String {
        match &self.envelope {
            Some(envelope) => envelope.to_html(),
            None => self.markup.clone(),
        }
    }
}

/// Render one pagelet.
///
/// An inactive pagelet yields an empty fragment without fetching data. When
/// fetching or the view fails, the error view renders a failure payload
/// instead. Without an error view the original error is returned inside
/// [`PageletError::Render`].
pub async fn render(
    pagelet: &mut Pagelet,
    req: &RequestContext,
    options: &RenderOptions,
) -> Result<Fragment, PageletError> {
    let active = pagelet.resolve(req, &options.alternates).await.is_active();
    if !active {
        return Ok(package(pagelet, options, String::new(), Value::Object(Map::new())));
    }

    let kind = pagelet.kind().clone();
    let name = kind.name().to_string();

    let fetched = match &options.data {
        Some(data) => Ok(data.clone()),
        None => kind.data().get(req).await,
    };

    let (data, result) = match fetched {
        Ok(mut data) => {
            embed(&mut data, &options.embedded);
            let result = match kind.view() {
                Some(view) => evaluate(view.as_ref(), &data),
                None => Ok(String::new()),
            };
            (data, result)
        }
        Err(err) => (Value::Object(Map::new()), Err(err)),
    };

    let markup = match result {
        Ok(markup) => markup,
        Err(err) => {
            if options.env.is_verbose() {
                tracing::debug!(pagelet = %name, id = %pagelet.id(), error = ?err, "captured render error");
            }
            let Some(error_view) = kind.error_view() else {
                return Err(PageletError::Render { name, source: err });
            };
            let payload = failure_payload(&data, &name, &err, options.env);
            evaluate(error_view.as_ref(), &payload)
                .map_err(|source| PageletError::Render { name: name.clone(), source })?
        }
    };

    let state = project(&data, &kind.config().query);
    Ok(package(pagelet, options, markup, state))
}

fn package(pagelet: &Pagelet, options: &RenderOptions, markup: String, state: Value) -> Fragment {
    let meta = pagelet.fragment_meta();
    let envelope = options.encodes().then(|| encode(&meta, &markup, &state));
    Fragment {
        meta,
        active: pagelet.is_active(),
        markup,
        state,
        envelope,
    }
}

/// Run a template, turning a panic into an error.
fn evaluate(template: &dyn Template, data: &Data) -> anyhow::Result<String> {
    match panic::catch_unwind(AssertUnwindSafe(|| template.render(data))) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!(
            "template panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn embed(data: &mut Data, embedded: &[(String, String)]) {
    if embedded.is_empty() {
        return;
    }
    if !data.is_object() {
        *data = Value::Object(Map::new());
    }
    if let Value::Object(map) = data {
        for (name, markup) in embedded {
            map.insert(name.clone(), Value::String(markup.clone()));
        }
    }
}

/// Data handed to the error view: the fetched data plus failure details.
fn failure_payload(data: &Data, name: &str, err: &anyhow::Error, env: Environment) -> Data {
    let mut payload = match data {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    payload.insert("reason".into(), json!(format!("Failed to render: {name}")));
    payload.insert("message".into(), json!(err.to_string()));
    payload.insert("stack".into(), json!(format!("{err:?}")));
    payload.insert("env".into(), json!(env.as_str()));
    Value::Object(payload)
}

/// Pick dot-path keys out of the data. Keys are kept flat; missing ones are
/// skipped.
fn project(data: &Data, keys: &[String]) -> Value {
    let mut state = Map::new();
    if data.is_object() {
        for key in keys {
            if let Some(value) = lookup(data, key) {
                state.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(state)
}

fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
