//! Safety gate for destructive migrations.
//!
//! The gate runs once when the migrator is built. It compares the target
//! endpoint's (server, database) identity against a declared list, either
//! rejecting listed endpoints ([`GateMode::Deny`]) or rejecting everything
//! that is not listed ([`GateMode::Allow`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AutoMigrateError, AutoMigrateResult};

/// A (server, database) identity, upper-cased for comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawEndpoint")]
pub struct Endpoint {
    server: String,
    database: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEndpoint {
    server: String,
    database: String,
}

impl TryFrom<RawEndpoint> for Endpoint {
    type Error = AutoMigrateError;

    fn try_from(raw: RawEndpoint) -> Result<Self, Self::Error> {
        Self::new(raw.server, raw.database)
    }
}

impl Endpoint {
    /// Create a normalized endpoint identity.
    ///
    /// Both parts are required.
    pub fn new(server: impl AsRef<str>, database: impl AsRef<str>) -> AutoMigrateResult<Self> {
        let server = server.as_ref().trim();
        let database = database.as_ref().trim();

        if server.is_empty() {
            return Err(AutoMigrateError::InvalidEndpoint(
                "server address is required".to_string(),
            ));
        }
        if database.is_empty() {
            return Err(AutoMigrateError::InvalidEndpoint(
                "database name is required".to_string(),
            ));
        }

        Ok(Self {
            server: server.to_uppercase(),
            database: database.to_uppercase(),
        })
    }

    /// Normalized server address.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Normalized database name.
    pub fn database(&self) -> &str {
        &self.database
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.server, self.database)
    }
}

/// How the gate interprets its endpoint list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    /// Listed endpoints are rejected.
    #[default]
    Deny,
    /// Only listed endpoints are accepted.
    Allow,
}

/// Endpoint list plus the mode it is checked in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyGate {
    /// Deny-list or allow-list.
    #[serde(default)]
    pub mode: GateMode,
    /// Endpoints in the list.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl SafetyGate {
    /// Reject the given endpoints, accept everything else.
    pub fn deny(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        Self {
            mode: GateMode::Deny,
            endpoints: endpoints.into_iter().collect(),
        }
    }

    /// Accept only the given endpoints.
    pub fn allow(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        Self {
            mode: GateMode::Allow,
            endpoints: endpoints.into_iter().collect(),
        }
    }

    /// Add an endpoint to the list.
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Whether the endpoint appears in the list.
    pub fn lists(&self, target: &Endpoint) -> bool {
        self.endpoints.iter().any(|e| e == target)
    }

    /// Decide whether destructive migrations may run against `target`.
    pub fn check(&self, target: &Endpoint) -> AutoMigrateResult<()> {
        let listed = self.lists(target);

        match (self.mode, listed) {
            (GateMode::Deny, true) => Err(AutoMigrateError::ForbiddenEndpoint {
                server: target.server.clone(),
                database: target.database.clone(),
            }),
            (GateMode::Allow, false) => Err(AutoMigrateError::UnlistedEndpoint {
                server: target.server.clone(),
                database: target.database.clone(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(server: &str, database: &str) -> Endpoint {
        Endpoint::new(server, database).unwrap()
    }

    #[test]
    fn test_endpoint_normalization() {
        let e = ep("prod-sql.example.com", "Sales");
        assert_eq!(e.server(), "PROD-SQL.EXAMPLE.COM");
        assert_eq!(e.database(), "SALES");
        assert_eq!(e, ep("PROD-SQL.example.COM", "sales"));
        assert_eq!(e.to_string(), "PROD-SQL.EXAMPLE.COM/SALES");
    }

    #[test]
    fn test_endpoint_requires_both_parts() {
        assert!(matches!(
            Endpoint::new("", "db"),
            Err(AutoMigrateError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            Endpoint::new("server", "  "),
            Err(AutoMigrateError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_deny_list_rejects_listed_endpoint() {
        let gate = SafetyGate::deny([ep("prod", "sales")]);
        let err = gate.check(&ep("PROD", "SALES")).unwrap_err();
        assert!(matches!(err, AutoMigrateError::ForbiddenEndpoint { .. }));
    }

    #[test]
    fn test_deny_list_accepts_other_endpoints() {
        let gate = SafetyGate::deny([ep("prod", "sales")]);
        assert!(gate.check(&ep("localhost", "sales")).is_ok());
        assert!(gate.check(&ep("prod", "sales_dev")).is_ok());
        assert!(SafetyGate::deny([]).check(&ep("prod", "sales")).is_ok());
    }

    #[test]
    fn test_allow_list_rejects_unlisted_endpoint() {
        let gate = SafetyGate::allow([ep("localhost", "dev")]);
        let err = gate.check(&ep("localhost", "prod")).unwrap_err();
        assert!(matches!(err, AutoMigrateError::UnlistedEndpoint { .. }));

        let empty = SafetyGate::allow([]);
        assert!(empty.check(&ep("localhost", "dev")).is_err());
    }

    #[test]
    fn test_allow_list_accepts_listed_endpoint() {
        let gate = SafetyGate::allow([ep("localhost", "dev")]).with_endpoint(ep("ci", "test"));
        assert!(gate.check(&ep("LOCALHOST", "Dev")).is_ok());
        assert!(gate.check(&ep("ci", "test")).is_ok());
    }

    #[test]
    fn test_no_partial_matching() {
        let gate = SafetyGate::deny([ep("prod", "sales")]);
        assert!(gate.check(&ep("prod2", "sales")).is_ok());
        assert!(gate.check(&ep("pro", "sales")).is_ok());
    }

    #[test]
    fn test_gate_deserialize() {
        let gate: SafetyGate = toml::from_str(
            r#"
            mode = "allow"
            endpoints = [{ server = "localhost", database = "dev" }]
            "#,
        )
        .unwrap();
        assert_eq!(gate.mode, GateMode::Allow);
        assert_eq!(gate.endpoints, vec![ep("LOCALHOST", "DEV")]);
    }

    #[test]
    fn test_gate_deserialize_rejects_empty_endpoint() {
        let result: Result<SafetyGate, _> = toml::from_str(
            r#"
            endpoints = [{ server = "", database = "dev" }]
            "#,
        );
        assert!(result.is_err());
    }
}
