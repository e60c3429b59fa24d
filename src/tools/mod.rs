//! Tool calls requested by the backend during a live session
//!
//! Each invocation produces exactly one [`ToolResult`], even for tools or apps
//! this client does not know.

mod apps;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use apps::{APPS, OPEN_APP, app_url, open_app_declaration};

use crate::{Error, Result};

/// A function call requested by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Call identifier, echoed back in the result
    #[serde(default)]
    pub id: String,
    /// Function name
    #[serde(default)]
    pub name: String,
    /// Arguments object
    #[serde(default)]
    pub args: Value,
}

/// The outcome of one tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Identifier of the invocation this answers
    pub id: String,
    /// Function name
    pub name: String,
    /// `"ok"` or a description of what went wrong
    pub result: String,
}

impl ToolResult {
    /// Successful result
    pub const OK: &'static str = "ok";

    fn for_call(call: &ToolInvocation, result: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            result: result.into(),
        }
    }

    /// Whether the tool reported success
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result == Self::OK
    }
}

/// Opens an external resource such as a web page
pub trait UrlOpener: Send + Sync {
    /// Open `url` outside this process
    ///
    /// # Errors
    ///
    /// Returns error if the resource could not be opened
    fn open(&self, url: &str) -> Result<()>;
}

/// Opens URLs with the desktop's default handler
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl UrlOpener for SystemOpener {
    fn open(&self, url: &str) -> Result<()> {
        open::that_detached(url).map_err(|e| Error::Tool(format!("failed to open {url}: {e}")))
    }
}

/// Maps tool invocations to side effects and results
pub struct ToolDispatcher {
    opener: Box<dyn UrlOpener>,
}

impl ToolDispatcher {
    /// Create a dispatcher that opens apps with `opener`
    #[must_use]
    pub fn new(opener: Box<dyn UrlOpener>) -> Self {
        Self { opener }
    }

    /// Run one invocation and produce its result
    #[must_use]
    pub fn dispatch(&self, call: &ToolInvocation) -> ToolResult {
        match call.name.as_str() {
            OPEN_APP => self.open_app(call),
            other => {
                tracing::warn!(tool = other, id = %call.id, "unknown tool requested");
                ToolResult::for_call(call, format!("Unknown tool: {other}"))
            }
        }
    }

    fn open_app(&self, call: &ToolInvocation) -> ToolResult {
        let app_name = call
            .args
            .get("appName")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let Some(url) = app_url(app_name) else {
            tracing::info!(app = app_name, "unknown app requested");
            return ToolResult::for_call(call, format!("Unknown app: {app_name}"));
        };

        // The model is told the app opened even if the launcher failed
        match self.opener.open(url) {
            Ok(()) => tracing::info!(app = app_name, url, "opened app"),
            Err(e) => tracing::warn!(app = app_name, error = %e, "failed to open app"),
        }

        ToolResult::for_call(call, ToolResult::OK)
    }
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::new(Box::new(SystemOpener))
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher").finish_non_exhaustive()
    }
}
