//! Research settings, layered from defaults, an optional TOML file and the
//! environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use dr_core::{Error, Result};
use dr_sources::firecrawl::DEFAULT_BASE_URL;
use dr_sources::Quota;

use crate::prompt::Language;

/// Numeric environment variables and the config fields they set.
const NUMERIC_ENV: &[(&str, &str)] = &[
    ("FIRECRAWL_CONCURRENCY", "concurrency_limit"),
    ("FIRECRAWL_SOURCES", "firecrawl_sources"),
    ("INTERNAL_SOURCES", "internal_sources"),
];

/// Environment variables taken verbatim as strings, never type-inferred.
const STRING_ENV: &[(&str, &str)] = &[
    ("DR_LANG", "language"),
    ("FIRECRAWL_KEY", "firecrawl_key"),
    ("FIRECRAWL_BASE_URL", "firecrawl_base_url"),
    ("DR_RETRIEVER_SCRIPT", "retriever_script"),
    ("DR_PYTHON", "retriever_python"),
    ("OPENAI_KEY", "openai_key"),
    ("OPENAI_ENDPOINT", "openai_base_url"),
    ("CUSTOM_MODEL", "model"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Branches allowed to fetch and distill at once, across the whole tree
    pub concurrency_limit: usize,
    /// Web hits per query; 0 disables web search
    pub firecrawl_sources: usize,
    /// Local retriever hits per query; 0 disables the retriever
    pub internal_sources: usize,
    pub language: Language,

    pub firecrawl_key: String,
    pub firecrawl_base_url: String,
    pub firecrawl_timeout_secs: u64,

    /// Retriever script path; `~`, `$VAR` and `${VAR}` are expanded
    pub retriever_script: String,
    pub retriever_python: String,

    pub distill_timeout_secs: u64,
    pub max_content_chars: usize,
    /// Requested depths above this are capped
    pub max_depth: usize,

    pub openai_key: String,
    pub openai_base_url: String,
    pub model: String,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 2,
            firecrawl_sources: 5,
            internal_sources: 3,
            language: Language::English,
            firecrawl_key: String::new(),
            firecrawl_base_url: DEFAULT_BASE_URL.to_string(),
            firecrawl_timeout_secs: 15,
            retriever_script: "database/retrieve_distilled.py".to_string(),
            retriever_python: "python".to_string(),
            distill_timeout_secs: 60,
            max_content_chars: 25_000,
            max_depth: 8,
            openai_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

impl ResearchConfig {
    /// Load settings. An explicit `path` must exist; the default config file
    /// is used only when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if !path.exists() => {
                return Err(Error::config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.exists()),
        };

        Self::figment(file.as_deref())
            .extract()
            .map_err(|e| Error::config(e.to_string()))
    }

    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(ResearchConfig::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        // Env values are parsed like TOML, so "123456" would become an integer;
        // string fields go through a map that keeps the raw text.
        let strings: BTreeMap<String, String> = env_fields(STRING_ENV)
            .iter()
            .map(|(field, value)| (field.as_str().to_string(), value))
            .collect();
        figment
            .merge(env_fields(NUMERIC_ENV))
            .merge(Serialized::defaults(strings))
    }

    /// `~/.config/deep-research/config.toml` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("deep-research").join("config.toml"))
    }

    /// The admission limit; 0 falls back to the default.
    pub fn concurrency(&self) -> usize {
        match self.concurrency_limit {
            0 => ResearchConfig::default().concurrency_limit,
            limit => limit,
        }
    }

    pub fn quota(&self) -> Quota {
        Quota::new(self.firecrawl_sources, self.internal_sources)
    }

    pub fn distill_timeout(&self) -> Duration {
        Duration::from_secs(self.distill_timeout_secs)
    }

    pub fn firecrawl_timeout(&self) -> Duration {
        Duration::from_secs(self.firecrawl_timeout_secs)
    }

    pub fn retriever_script_path(&self) -> PathBuf {
        expand_path(&self.retriever_script)
    }
}

/// Environment variables named in `fields` (any case), keyed by config field.
fn env_fields(fields: &'static [(&'static str, &'static str)]) -> Env {
    Env::raw().filter_map(move |key| {
        fields
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, field)| (*field).into())
    })
}

/// Expand environment variables in a path string.
/// Supports: $VAR, ${VAR}, ~
pub fn expand_path(path: &str) -> PathBuf {
    let mut result = path.to_string();

    if result.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            result = format!("{}{}", home.display(), &result[1..]);
        }
    } else if result == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }

    let re = match regex::Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?") {
        Ok(re) => re,
        Err(_) => return PathBuf::from(result),
    };
    let expanded = re.replace_all(&result, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    PathBuf::from(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = ResearchConfig::default();
        assert_eq!(config.concurrency(), 2);
        assert_eq!(config.quota(), Quota::new(5, 3));
        assert_eq!(config.distill_timeout(), Duration::from_secs(60));
        assert_eq!(config.language, Language::English);
        assert_eq!(config.firecrawl_base_url, "https://api.firecrawl.dev");
    }

    #[test]
    fn test_zero_concurrency_falls_back_to_default() {
        let config = ResearchConfig {
            concurrency_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.concurrency(), 2);

        let config = ResearchConfig {
            concurrency_limit: 1,
            ..Default::default()
        };
        assert_eq!(config.concurrency(), 1);
    }

    #[test]
    fn test_string_env_values_are_not_type_inferred() {
        Jail::expect_with(|jail| {
            jail.set_env("FIRECRAWL_KEY", "123456");
            jail.set_env("CUSTOM_MODEL", "true");
            jail.set_env("DR_LANG", "1");
            jail.set_env("DR_PYTHON", "3");
            jail.set_env("INTERNAL_SOURCES", "7");

            let config = ResearchConfig::figment(None)
                .extract::<ResearchConfig>()
                .map_err(|e| e.to_string())?;

            assert_eq!(config.firecrawl_key, "123456");
            assert_eq!(config.model, "true");
            assert_eq!(config.language, Language::English);
            assert_eq!(config.retriever_python, "3");
            assert_eq!(config.internal_sources, 7);
            Ok(())
        });
    }

    #[test]
    fn test_string_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", r#"openai_key = "from-file""#)?;
            jail.set_env("OPENAI_KEY", "from-env");

            let config = ResearchConfig::load(Some(Path::new("config.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.openai_key, "from-env");
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                    firecrawl_sources = 9
                    internal_sources = 1
                    model = "gpt-4o"
                "#,
            )?;
            jail.set_env("FIRECRAWL_SOURCES", "0");
            jail.set_env("FIRECRAWL_CONCURRENCY", "4");
            jail.set_env("DR_LANG", "cn");

            let config = ResearchConfig::load(Some(Path::new("config.toml")))
                .map_err(|e| e.to_string())?;

            assert_eq!(config.firecrawl_sources, 0);
            assert_eq!(config.internal_sources, 1);
            assert_eq!(config.concurrency_limit, 4);
            assert_eq!(config.model, "gpt-4o");
            assert_eq!(config.language, Language::Chinese);
            Ok(())
        });
    }

    #[test]
    fn test_unrelated_env_is_ignored() {
        Jail::expect_with(|jail| {
            jail.set_env("CONCURRENCY_LIMIT", "99");
            let config = ResearchConfig::figment(None)
                .extract::<ResearchConfig>()
                .map_err(|e| e.to_string())?;
            assert_eq!(config.concurrency_limit, 2);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_number_is_config_error() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "")?;
            jail.set_env("INTERNAL_SOURCES", "many");
            let result = ResearchConfig::load(Some(Path::new("config.toml")));
            assert!(matches!(result, Err(Error::Config(_))));
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = ResearchConfig::load(Some(Path::new("/nonexistent/deep-research.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_expand_path() {
        Jail::expect_with(|jail| {
            jail.set_env("DR_TEST_DATA_DIR", "/data");
            assert_eq!(expand_path("$DR_TEST_DATA_DIR/retrieve.py"), PathBuf::from("/data/retrieve.py"));
            assert_eq!(expand_path("${DR_TEST_DATA_DIR}/x.py"), PathBuf::from("/data/x.py"));
            assert_eq!(expand_path("$DR_TEST_UNSET_VAR/x"), PathBuf::from("$DR_TEST_UNSET_VAR/x"));
            if let Some(home) = dirs::home_dir() {
                assert_eq!(expand_path("~/db/r.py"), home.join("db/r.py"));
            }
            Ok(())
        });
    }
}
