//! Server capability manifest and the feature set derived from it.
//!
//! The server answers `OPTIONS /api` with the versions of the endpoints it
//! implements. Call sites never compare versions themselves; they ask a
//! [`ServerFeatures`] value, which is either derived from the manifest or
//! injected when the client is built.

use serde_json::Value;

/// Snapshot of the server's capability manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities(Value);

impl Capabilities {
    pub fn new(manifest: Value) -> Capabilities {
        Capabilities(manifest)
    }

    pub fn manifest(&self) -> &Value {
        &self.0
    }

    /// Declared version of an endpoint, `None` when the endpoint is unknown.
    pub fn endpoint_version(&self, endpoint: &str) -> Option<u64> {
        self.0
            .get("endpoints")?
            .get(endpoint)?
            .get("version")?
            .as_u64()
    }

    pub fn has_endpoint(&self, endpoint: &str) -> bool {
        self.0
            .get("endpoints")
            .and_then(|e| e.get(endpoint))
            .is_some()
    }

    fn version_at_least(&self, endpoint: &str, version: u64) -> bool {
        self.endpoint_version(endpoint)
            .is_some_and(|v| v >= version)
    }
}

/// Version-gated behaviour of the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerFeatures {
    /// `report_session_start` accepts `parent_logical_id`.
    pub parent_logical_id: bool,
    /// `report_test_start` accepts `metadata`.
    pub inline_test_metadata: bool,
    /// `report_test_start` accepts `scm_local_branch` / `scm_remote_branch`.
    pub scm_branches: bool,
    /// `report_session_end` accepts `has_fatal_errors`.
    pub session_fatal_errors: bool,
    /// `add_error` accepts `is_interruption`.
    pub error_interruptions: bool,
    /// `add_error` accepts `is_fatal`.
    pub error_fatal_flag: bool,
    pub test_distribution: bool,
    pub upcoming_tests: bool,
}

impl ServerFeatures {
    /// Every feature enabled, for servers known to be current.
    pub fn all() -> ServerFeatures {
        ServerFeatures {
            parent_logical_id: true,
            inline_test_metadata: true,
            scm_branches: true,
            session_fatal_errors: true,
            error_interruptions: true,
            error_fatal_flag: true,
            test_distribution: true,
            upcoming_tests: true,
        }
    }
}

impl From<&Capabilities> for ServerFeatures {
    fn from(caps: &Capabilities) -> Self {
        ServerFeatures {
            parent_logical_id: caps.version_at_least("report_session_start", 2),
            inline_test_metadata: caps.version_at_least("report_test_start", 2),
            scm_branches: caps.version_at_least("report_test_start", 3),
            session_fatal_errors: caps.version_at_least("report_session_end", 2),
            error_interruptions: caps.version_at_least("add_error", 4),
            error_fatal_flag: caps.version_at_least("add_error", 5),
            test_distribution: caps.has_endpoint("report_test_distributed"),
            upcoming_tests: caps.has_endpoint("append_upcoming_tests"),
        }
    }
}
