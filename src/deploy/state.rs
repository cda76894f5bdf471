// ABOUTME: Pipeline state marker types for the type state pattern.
// ABOUTME: Each state carries exactly the data the next phase needs.

/// Record loaded and PENDING. Available actions: `provision()`, `reuse_host()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Pending;

/// Instance exists. Available actions: `await_readiness()`
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub(crate) host: String,
}

/// Host accepted for configuration. Available actions: `configure()`
#[derive(Debug, Clone)]
pub struct Reachable {
    pub(crate) host: String,
}

/// Instance configured. Available actions: `build()`
#[derive(Debug, Clone)]
pub struct Configured {
    pub(crate) host: String,
}

/// Application built. Available actions: `deploy()`
#[derive(Debug, Clone)]
pub struct Built {
    pub(crate) host: String,
}

/// Application started. Available actions: `complete()`
#[derive(Debug, Clone)]
pub struct Deployed {
    pub(crate) url: String,
}

impl Provisioned {
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Reachable {
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Configured {
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Built {
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Deployed {
    pub fn url(&self) -> &str {
        &self.url
    }
}
