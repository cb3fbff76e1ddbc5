use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const ENV_PREFIX: &str = "CARS";

/// All runtime settings. Loaded once in `main` and handed to each component.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub crawl: CrawlSettings,
    pub fetcher: FetcherSettings,
    pub completion: CompletionSettings,
    pub server: ServerSettings,
}

impl Settings {
    /// Optional TOML file, overridden by `CARS_<SECTION>__<KEY>` variables.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        builder = match file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("cars").required(false)),
        };
        let builder = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let settings: Settings = builder.try_deserialize()?;
        settings.crawl.delay()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/cars.sqlite"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    pub models: Vec<String>,
    pub years: Vec<i32>,
    /// Fixed pause between consecutive requests.
    pub delay_secs: f64,
    pub review_base_url: String,
    pub spec_base_url: String,
    pub page_size: u32,
    pub max_pages: u32,
}

impl CrawlSettings {
    /// `delay_secs` as a `Duration`. Negative, NaN or out-of-range values are rejected.
    pub fn delay(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.delay_secs).map_err(|e| {
            ConfigError::Message(format!("crawl.delay_secs = {}: {e}", self.delay_secs))
        })
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            models: [
                "prius", "camry", "corolla", "highlander", "rav4", "sienna", "tacoma", "tundra",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            years: vec![2025, 2024, 2023, 2022, 2021, 2020],
            delay_secs: 5.0,
            review_base_url: "https://www.edmunds.com/toyota".into(),
            spec_base_url: "https://www.cars.com/research/toyota-".into(),
            page_size: 50,
            max_pages: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchBackend {
    Http,
    Spider,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherSettings {
    pub backend: FetchBackend,
    pub user_agent: String,
    pub referer: Option<String>,
    pub spider_api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            backend: FetchBackend::Http,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .into(),
            referer: Some("https://www.edmunds.com/toyota".into()),
            spider_api_key: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Character cap on the concatenated review text sent per vehicle.
    pub char_budget: usize,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            model: "gpt-4".into(),
            temperature: 0.7,
            max_tokens: 300,
            char_budget: 8192,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_pipeline_constants() {
        let s = Settings::default();
        assert_eq!(s.completion.char_budget, 8192);
        assert_eq!(s.completion.max_tokens, 300);
        assert!((s.completion.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(s.crawl.models.len(), 8);
        assert_eq!(s.crawl.years.first(), Some(&2025));
        assert_eq!(s.crawl.delay().unwrap(), Duration::from_secs(5));
        assert_eq!(s.fetcher.backend, FetchBackend::Http);
    }

    #[test]
    fn file_overrides_are_partial() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[crawl]
models = ["prius"]
years = [2024]
delay_secs = 0.5

[fetcher]
backend = "spider"
"#
        )
        .unwrap();

        let s = Settings::load(Some(file.path())).unwrap();
        assert_eq!(s.crawl.models, vec!["prius"]);
        assert_eq!(s.crawl.years, vec![2024]);
        assert_eq!(s.crawl.delay().unwrap(), Duration::from_millis(500));
        assert_eq!(s.crawl.page_size, 50);
        assert_eq!(s.fetcher.backend, FetchBackend::Spider);
        assert_eq!(s.database.path, PathBuf::from("data/cars.sqlite"));
    }

    #[test]
    fn unusable_delay_is_a_config_error() {
        for bad in [f64::INFINITY, f64::NAN, -1.0, 1e300] {
            let crawl = CrawlSettings {
                delay_secs: bad,
                ..Default::default()
            };
            assert!(matches!(crawl.delay(), Err(ConfigError::Message(_))), "{bad}");
        }
    }

    #[test]
    fn load_rejects_oversized_delay() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[crawl]\ndelay_secs = 1e300").unwrap();
        assert!(Settings::load(Some(file.path())).is_err());
    }
}
