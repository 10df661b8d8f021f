//! Connection URL parsing.
//!
//! Accepted forms:
//! - `rest://host:port/db?user=u&password=p` → REST over plain HTTP
//! - `http(s)://host:port[/rest][/db][?db=..]` → REST with the given scheme
//! - anything else (`taos://…`, `jdbc:TAOS://…`) → opaque native-driver DSN

use crate::error::{ConfigError, Result};
use url::Url;

pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_PASSWORD: &str = "taosdata";

/// Which transport a URL selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Rest,
    Native,
}

/// A parsed connection URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub kind: TransportKind,
    /// The URL as given; used verbatim as the native DSN.
    pub raw: String,
    /// `scheme://host[:port]/rest` for REST endpoints.
    pub rest_base: Option<String>,
    pub database: Option<String>,
    pub user: String,
    pub password: String,
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(invalid(raw, "connection url must not be blank"));
        }

        let params = QueryParams::from_url(raw);
        let user = params.get("user").unwrap_or(DEFAULT_USER).to_string();
        let password = params.get("password").unwrap_or(DEFAULT_PASSWORD).to_string();
        let query_db = params
            .get("db")
            .or_else(|| params.get("database"))
            .map(str::to_string);

        let lower = raw.to_ascii_lowercase();
        let is_rest = ["rest://", "http://", "https://"]
            .iter()
            .any(|prefix| lower.starts_with(prefix));

        if !is_rest {
            return Ok(Self {
                kind: TransportKind::Native,
                raw: raw.to_string(),
                rest_base: None,
                database: query_db,
                user,
                password,
            });
        }

        let url = Url::parse(raw).map_err(|e| invalid(raw, &e.to_string()))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid(raw, "missing host"))?;
        let scheme = if url.scheme().eq_ignore_ascii_case("https") {
            "https"
        } else {
            "http"
        };
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let path_db = url
            .path_segments()
            .into_iter()
            .flatten()
            .find(|segment| !segment.is_empty() && *segment != "rest" && *segment != "sql")
            .map(str::to_string);

        Ok(Self {
            kind: TransportKind::Rest,
            raw: raw.to_string(),
            rest_base: Some(format!("{scheme}://{authority}/rest")),
            database: query_db.or(path_db),
            user,
            password,
        })
    }

    /// Replace the credentials parsed from the URL.
    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.user = user.to_string();
        self.password = password.to_string();
        self
    }

    /// SQL endpoint for REST requests, carrying `?db=` when a database is known.
    pub fn rest_sql_url(&self) -> Option<String> {
        let base = self.rest_base.as_ref()?;
        let mut url = format!("{base}/sql");
        if let Some(db) = &self.database {
            let encoded: String = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("db", db)
                .finish();
            url.push('?');
            url.push_str(&encoded);
        }
        Some(url)
    }
}

fn invalid(url: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Decoded query parameters; the last occurrence of a key wins.
struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    fn from_url(raw: &str) -> Self {
        let query = raw.split_once('?').map(|(_, q)| q).unwrap_or("");
        let query = query.split('#').next().unwrap_or("");
        Self(
            url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .collect(),
        )
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }
}
