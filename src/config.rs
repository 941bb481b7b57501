use std::{env, path::PathBuf, time::Duration};

use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

const DEFAULT_WORKSPACE_URL: &str = "https://hackclub.slack.com";
const DEFAULT_COOKIE_DOMAIN: &str = ".slack.com";
const DEFAULT_EXPORT_DIR: &str = "exports";
const DEFAULT_FILTER_FIELD: &str = "Type";
const DEFAULT_DATE_FIELD: &str = "Date range";
const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 30;

/// Which listing-table parser to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    Regex,
    Html,
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub workspace_url: Url,
    /// `d` session token; the only cookie the listing endpoint needs.
    pub token: String,
    /// Extra session cookies (`b`, `x`, `d-s`, `lc`) when present.
    pub extra_cookies: Vec<(String, String)>,
    pub cookie_domain: String,
    pub export_dir: PathBuf,
    pub filter_field: String,
    pub date_field: String,
    pub parser: ParserKind,
    pub headless: bool,
    pub wait_timeout: Duration,
}

impl Config {
    /// Load from the process environment, after pulling in `.env` if one exists.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let raw_url = get("SLACK_WORKSPACE_URL").unwrap_or_else(|| DEFAULT_WORKSPACE_URL.into());
        let workspace_url = Url::parse(&raw_url)
            .map_err(|e| Error::config("SLACK_WORKSPACE_URL", e.to_string()))?;

        let token = get("D").ok_or_else(|| Error::config("D", "session token is not set"))?;

        let extra_cookies = [("B", "b"), ("X", "x"), ("D_S", "d-s"), ("LC", "lc")]
            .iter()
            .filter_map(|&(var, name)| get(var).map(|v| (name.to_string(), v)))
            .collect();

        let parser = match get("LISTING_PARSER").as_deref() {
            None | Some("regex") => ParserKind::Regex,
            Some("html") => ParserKind::Html,
            Some(other) => {
                return Err(Error::config(
                    "LISTING_PARSER",
                    format!("expected `regex` or `html`, got `{}`", other),
                ))
            }
        };

        let headless = match get("BROWSER_HEADLESS") {
            None => true,
            Some(v) => parse_bool(&v).ok_or_else(|| {
                Error::config("BROWSER_HEADLESS", format!("not a boolean: `{}`", v))
            })?,
        };

        let wait_timeout = match get("BROWSER_WAIT_TIMEOUT_SECS") {
            None => Duration::from_secs(DEFAULT_WAIT_TIMEOUT_SECS),
            Some(v) => v.parse::<u64>().map(Duration::from_secs).map_err(|_| {
                Error::config(
                    "BROWSER_WAIT_TIMEOUT_SECS",
                    format!("not a number of seconds: `{}`", v),
                )
            })?,
        };

        Ok(Self {
            workspace_url,
            token,
            extra_cookies,
            cookie_domain: get("SLACK_COOKIE_DOMAIN").unwrap_or_else(|| DEFAULT_COOKIE_DOMAIN.into()),
            export_dir: get("EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIR)),
            filter_field: get("EXPORT_FILTER_FIELD").unwrap_or_else(|| DEFAULT_FILTER_FIELD.into()),
            date_field: get("EXPORT_DATE_FIELD").unwrap_or_else(|| DEFAULT_DATE_FIELD.into()),
            parser,
            headless,
            wait_timeout,
        })
    }

    /// The page listing past exports.
    pub fn listing_url(&self) -> Result<Url> {
        self.join("services/export")
    }

    /// The page hosting the export wizard.
    pub fn export_page_url(&self) -> Result<Url> {
        self.join("services/export/")
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.workspace_url
            .join(path)
            .map_err(|e| Error::config("SLACK_WORKSPACE_URL", e.to_string()))
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config_from(&[("D", "xoxd-abc")]).unwrap();
        assert_eq!(cfg.token, "xoxd-abc");
        assert!(cfg.extra_cookies.is_empty());
        assert_eq!(cfg.export_dir, PathBuf::from("exports"));
        assert_eq!(cfg.filter_field, "Type");
        assert_eq!(cfg.date_field, "Date range");
        assert_eq!(cfg.parser, ParserKind::Regex);
        assert!(cfg.headless);
        assert_eq!(cfg.wait_timeout, Duration::from_secs(30));
        assert_eq!(
            cfg.listing_url().unwrap().as_str(),
            "https://hackclub.slack.com/services/export"
        );
        assert_eq!(
            cfg.export_page_url().unwrap().as_str(),
            "https://hackclub.slack.com/services/export/"
        );
    }

    #[test]
    fn test_missing_token() {
        let err = config_from(&[]).unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == "D"));

        let err = config_from(&[("D", "")]).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_extra_cookies_and_overrides() {
        let cfg = config_from(&[
            ("D", "tok"),
            ("D_S", "ds"),
            ("B", "bb"),
            ("SLACK_WORKSPACE_URL", "https://acme.slack.com"),
            ("LISTING_PARSER", "html"),
            ("BROWSER_HEADLESS", "false"),
            ("BROWSER_WAIT_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(
            cfg.extra_cookies,
            vec![
                ("b".to_string(), "bb".to_string()),
                ("d-s".to_string(), "ds".to_string())
            ]
        );
        assert_eq!(cfg.parser, ParserKind::Html);
        assert!(!cfg.headless);
        assert_eq!(cfg.wait_timeout, Duration::from_secs(5));
        assert_eq!(
            cfg.listing_url().unwrap().as_str(),
            "https://acme.slack.com/services/export"
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(config_from(&[("D", "t"), ("LISTING_PARSER", "xml")]).is_err());
        assert!(config_from(&[("D", "t"), ("BROWSER_HEADLESS", "maybe")]).is_err());
        assert!(config_from(&[("D", "t"), ("BROWSER_WAIT_TIMEOUT_SECS", "soon")]).is_err());
        assert!(config_from(&[("D", "t"), ("SLACK_WORKSPACE_URL", "not a url")]).is_err());
    }
}
