//! Query context bound next to the connection of a unit of work
//!
//! The query context carries what a query builder needs besides the
//! connection itself: the SQL dialect and session settings. It is resolved
//! from [`QueryConfig`] once per unit of work, when the unit begins.

use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// SQL dialect spoken by the connection source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Postgres,
    MySql,
    Sqlite,
    /// Dialect-neutral SQL
    Standard,
}

/// Session settings applied to the connection when a unit of work begins
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct QuerySettings {
    /// Schema search path, most specific first
    #[serde(default)]
    pub search_path: Vec<String>,
    /// Upper bound on a single statement
    #[serde(default, with = "millis")]
    pub statement_timeout: Option<Duration>,
}

impl QuerySettings {
    pub fn search_path<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_path = schemas.into_iter().map(Into::into).collect();
        self
    }

    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Returns true if nothing needs applying to the session
    pub fn is_empty(&self) -> bool {
        self.search_path.is_empty() && self.statement_timeout.is_none()
    }
}

/// Fully resolved query context of one unit of work
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryContext {
    dialect: SqlDialect,
    settings: QuerySettings,
}

impl QueryContext {
    pub fn new(dialect: SqlDialect, settings: QuerySettings) -> Self {
        Self { dialect, settings }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }
}

/// How the query context of each unit of work is built
///
/// A complete `template` context takes precedence over `dialect` and
/// `settings`; supplying settings alongside a template is allowed but the
/// settings are ignored.
#[derive(Debug, Clone, Default)]
pub struct QueryConfig {
    pub dialect: SqlDialect,
    pub settings: Option<QuerySettings>,
    pub template: Option<QueryContext>,
}

impl QueryConfig {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            ..Default::default()
        }
    }

    pub fn with_settings(mut self, settings: QuerySettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_template(mut self, template: QueryContext) -> Self {
        self.template = Some(template);
        self
    }

    /// Builds the query context for a new unit of work
    pub fn resolve(&self) -> QueryContext {
        if let Some(template) = &self.template {
            debug!(dialect = ?template.dialect, "Creating query context from template");
            if self.settings.is_some() {
                warn!("Configured query settings are ignored since a full query context template was supplied");
            }
            return template.clone();
        }

        match &self.settings {
            Some(settings) => {
                debug!(dialect = ?self.dialect, "Creating query context with settings");
                QueryContext::new(self.dialect, settings.clone())
            }
            None => {
                debug!(dialect = ?self.dialect, "Creating query context");
                QueryContext::new(self.dialect, QuerySettings::default())
            }
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_settings() {
        let context = QueryConfig::new(SqlDialect::MySql).resolve();

        assert_eq!(context.dialect(), SqlDialect::MySql);
        assert!(context.settings().is_empty());
    }

    #[test]
    fn test_settings_are_applied() {
        let settings = QuerySettings::default().search_path(["ledger", "public"]);
        let context = QueryConfig::new(SqlDialect::Postgres)
            .with_settings(settings.clone())
            .resolve();

        assert_eq!(context.settings(), &settings);
    }

    #[test]
    fn test_template_wins_over_settings() {
        let template = QueryContext::new(SqlDialect::Sqlite, QuerySettings::default());
        let context = QueryConfig::new(SqlDialect::Postgres)
            .with_settings(QuerySettings::default().statement_timeout(Duration::from_secs(5)))
            .with_template(template.clone())
            .resolve();

        assert_eq!(context, template);
        assert!(context.settings().statement_timeout.is_none());
    }
}
