//! corral - remote app registry
//!
//! A Corral rounds up a herd of independently addressable remote apps. Each
//! app exposes the same capability surface:
//!
//! - a **manifest** describing the app (`GET {scheme}://{app_id}/manifest`)
//! - an **input and output schema** (`GET {scheme}://{app_id}/schema?type=...`)
//! - an **execution channel** (`{duplex_scheme}://{app_id}/app`, see the
//!   `tether` crate)
//! - a **resource endpoint** for dereferencing deferred result fields
//!   (`GET {scheme}://{app_id}/resource?reid=...`)
//!
//! [`Registry::initialize`] bootstraps every requested app id independently:
//! manifest, input schema, output schema, then the tether. An app that fails
//! any step is logged and left out; the rest of the herd is unaffected. The
//! entry map never changes after construction.
//!
//! `Registry::call` executes a request on an app's tether and then resolves
//! schema-flagged resource fields in the result with follow-up fetches.
//! Execution and resolution failures degrade to an empty or partially
//! resolved document rather than an error; callers treat that as "app
//! currently unavailable" and skip the stage.
//!
//! ```ignore
//! let config = CorralConfig::load()?;
//! let registry = Registry::initialize(&config.wire, &config.apps).await;
//!
//! let result = registry.call("text-to-image.test", json!({"prompt": "a red fox"}), None).await?;
//! ```

mod error;

pub mod fetch;
pub mod registry;
pub mod resolve;

pub use error::RegistryError;
pub use fetch::{FetchError, Fetcher, SchemaKind};
pub use registry::{CallOutcome, Registry};
pub use resolve::{has_resource_fields, resolve, Resolution};
