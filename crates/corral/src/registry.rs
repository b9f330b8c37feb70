//! The registry: per-app bootstrap, then manifest/schema/call.
//!
//! Bootstrap runs once at construction and the entry map is immutable
//! afterwards, so concurrent readers need no locking; each entry's tether
//! synchronizes its own in-flight requests internally. Entries are
//! all-or-nothing: an app id is present only if its manifest, both schemas,
//! and the tether all came up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use corralconf::WireConfig;
use serde_json::{json, Value};
use tether::{Tether, TetherOptions};
use tracing::{debug, error, info, warn};

use crate::error::RegistryError;
use crate::fetch::{Fetcher, SchemaKind};
use crate::resolve::{resolve, Resolution};

/// Everything the registry holds for one ready app.
struct Entry {
    manifest: Value,
    input_schema: Value,
    output_schema: Value,
    tether: Arc<Tether>,
}

/// How a `call` concluded, for asserting in tests and deciding what to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// Execution succeeded; the resolution pass ran (or was skipped because
    /// the schema flags nothing).
    Completed(Resolution),
    /// Execution itself failed; the caller got an empty document.
    Degraded,
}

/// Immutable map from app id to its manifest, schemas, and tether.
pub struct Registry {
    entries: HashMap<String, Entry>,
    fetcher: Fetcher,
    default_uid: String,
}

impl Registry {
    /// Bootstrap every requested app id and build the registry.
    ///
    /// The four steps per id - manifest, input schema, output schema,
    /// tether - run independently across ids; one id failing never aborts
    /// another. A failed id is logged and simply absent afterwards. This
    /// never fails as a whole: an empty registry is a valid (if useless)
    /// outcome.
    pub async fn initialize(wire: &WireConfig, app_ids: &[String]) -> Self {
        let fetcher = Fetcher::new(
            &wire.fetch_scheme,
            Duration::from_millis(wire.fetch_timeout_ms),
        );

        let bootstraps = app_ids.iter().map(|app_id| {
            let fetcher = &fetcher;
            async move { (app_id, bootstrap(fetcher, wire, app_id).await) }
        });

        let mut entries = HashMap::new();
        for (app_id, outcome) in futures::future::join_all(bootstraps).await {
            match outcome {
                Ok(entry) => {
                    if entries.contains_key(app_id.as_str()) {
                        debug!(app_id = %app_id, "duplicate app id in bootstrap list, keeping first");
                        entry.tether.shutdown().await;
                        continue;
                    }
                    info!(app_id = %app_id, "app ready");
                    entries.insert(app_id.clone(), entry);
                }
                Err(e) => {
                    error!(app_id = %app_id, error = %e, "bootstrap failed, app left out");
                }
            }
        }

        Self {
            entries,
            fetcher,
            default_uid: wire.default_uid.clone(),
        }
    }

    /// Execute `data` on an app and resolve any resource fields in the
    /// result.
    ///
    /// `NotFound` is the only error callers see: an execution or resolution
    /// failure after lookup degrades to an empty or partially resolved
    /// document plus a logged error, never an `Err`. When `uid` is `None`
    /// the configured default uid is used.
    pub async fn call(
        &self,
        app_id: &str,
        data: Value,
        uid: Option<&str>,
    ) -> Result<Value, RegistryError> {
        self.call_with_outcome(app_id, data, uid)
            .await
            .map(|(result, _)| result)
    }

    /// Like [`call`](Self::call), but also reports how the call concluded.
    pub async fn call_with_outcome(
        &self,
        app_id: &str,
        data: Value,
        uid: Option<&str>,
    ) -> Result<(Value, CallOutcome), RegistryError> {
        let entry = self
            .entries
            .get(app_id)
            .ok_or_else(|| RegistryError::NotFound(app_id.to_string()))?;
        let uid = uid.unwrap_or(&self.default_uid);

        let result = match entry.tether.call(data, uid).await {
            Ok(result) => result,
            Err(e) => {
                error!(app_id = %app_id, uid = %uid, error = %e,
                       "execution failed, returning empty result");
                return Ok((json!({}), CallOutcome::Degraded));
            }
        };

        let (resolved, resolution) =
            resolve(&self.fetcher, app_id, result, &entry.output_schema).await;
        if let Resolution::Partial { failed } = &resolution {
            warn!(app_id = %app_id, failed = failed.len(),
                  "result partially resolved");
        }

        Ok((resolved, CallOutcome::Completed(resolution)))
    }

    /// The stored manifest for an app, or an empty document if the id is
    /// unknown. Never errors.
    pub fn manifest(&self, app_id: &str) -> Value {
        self.entries
            .get(app_id)
            .map(|entry| entry.manifest.clone())
            .unwrap_or_else(|| json!({}))
    }

    /// The stored input or output schema for an app.
    ///
    /// `kind` must be `"input"` or `"output"` - anything else is a caller
    /// bug and fails with `InvalidArgument`. An unknown id is `NotFound`.
    pub fn schema(&self, app_id: &str, kind: &str) -> Result<&Value, RegistryError> {
        let kind: SchemaKind = kind.parse()?;
        let entry = self
            .entries
            .get(app_id)
            .ok_or_else(|| RegistryError::NotFound(app_id.to_string()))?;

        Ok(match kind {
            SchemaKind::Input => &entry.input_schema,
            SchemaKind::Output => &entry.output_schema,
        })
    }

    /// Ids that bootstrapped successfully, sorted for stable output.
    pub fn apps(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Did this app id bootstrap successfully?
    pub fn is_ready(&self, app_id: &str) -> bool {
        self.entries.contains_key(app_id)
    }

    /// Tear down every tether. The registry is unusable for calls
    /// afterwards; manifests and schemas remain readable.
    pub async fn shutdown(&self) {
        for (app_id, entry) in &self.entries {
            debug!(app_id = %app_id, "closing tether");
            entry.tether.shutdown().await;
        }
    }
}

/// The four-step bootstrap for one app id. Any step failing fails the id.
async fn bootstrap(
    fetcher: &Fetcher,
    wire: &WireConfig,
    app_id: &str,
) -> Result<Entry, RegistryError> {
    let manifest = fetcher.manifest(app_id).await?;
    debug!(app_id = %app_id, "manifest loaded");

    let input_schema = fetcher.schema(app_id, SchemaKind::Input).await?;
    debug!(app_id = %app_id, "input schema loaded");

    let output_schema = fetcher.schema(app_id, SchemaKind::Output).await?;
    debug!(app_id = %app_id, "output schema loaded");

    let url = format!(
        "{}://{}/app",
        wire.duplex_scheme,
        app_id.trim_end_matches('/')
    );
    let options = TetherOptions {
        timeout: Duration::from_millis(wire.call_timeout_ms),
    };
    let tether = Tether::connect(&url, app_id, options).await?;
    debug!(app_id = %app_id, "tether established");

    Ok(Entry {
        manifest,
        input_schema,
        output_schema,
        tether,
    })
}
