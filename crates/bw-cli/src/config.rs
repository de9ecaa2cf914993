use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use bw_lister::{KeyFilter, ObjectSource, ObjectStoreSource};
use bw_notify::{ChannelSink, LogSink, Sink, WebhookSink};
use bw_store::FileSnapshotStore;
use bw_types::{ChangeEvent, WatchTarget};
use bw_watch::{WatchConfig, MAX_POLL_INTERVAL_SECS};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Queue length of the stdout sink when none is configured.
pub const DEFAULT_STDOUT_CAPACITY: usize = 1024;

fn default_stdout_capacity() -> usize {
    DEFAULT_STDOUT_CAPACITY
}

/// The watcher configuration file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatcherFile {
    /// Directory holding one snapshot file per target.
    pub state_dir: PathBuf,
    /// Settings shared by every target.
    #[serde(default)]
    pub defaults: WatchConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// Where buckets are listed from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Google Cloud Storage; credentials come from the environment.
    #[default]
    Gcs,
    /// Amazon S3 or a compatible server such as MinIO.
    S3 {
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
    },
    /// Buckets are directories under `root`.
    Local { root: PathBuf },
    /// Empty in-process buckets, for dry runs.
    Memory,
}

/// Where change events are sent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    #[default]
    Log,
    /// One JSON line per event on stdout.
    Stdout {
        #[serde(default = "default_stdout_capacity")]
        capacity: usize,
    },
    Webhook {
        url: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

/// One watched bucket/prefix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub include_suffixes: Vec<String>,
    #[serde(default)]
    pub exclude_prefixes: Vec<String>,
    /// Per-target override of `defaults.poll_interval_secs`.
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

impl TargetConfig {
    pub fn target(&self) -> WatchTarget {
        WatchTarget::new(self.bucket.clone(), self.prefix.clone())
    }

    pub fn filter(&self) -> KeyFilter {
        KeyFilter {
            include_suffixes: self.include_suffixes.clone(),
            exclude_prefixes: self.exclude_prefixes.clone(),
        }
    }
}

/// A built sink, plus the queue to drain when it is a channel.
pub struct BuiltSink {
    pub sink: Arc<dyn Sink>,
    pub events: Option<mpsc::Receiver<ChangeEvent>>,
}

/// Everything needed to build one watch loop.
#[derive(Clone, Debug)]
pub struct WatchSpec {
    pub target: WatchTarget,
    pub filter: KeyFilter,
    pub config: WatchConfig,
}

impl WatcherFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Every reason the file cannot be used; empty when valid.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.targets.is_empty() {
            problems.push("no targets configured".to_string());
        }
        if let Err(e) = self.defaults.validate() {
            problems.push(format!("defaults: {e}"));
        }

        let mut seen = HashSet::new();
        for (i, target) in self.targets.iter().enumerate() {
            let watch = target.target();
            if let Err(e) = watch.validate() {
                problems.push(format!("targets[{i}]: {e}"));
            }
            match target.poll_interval_secs {
                Some(0) => problems.push(format!("targets[{i}]: poll interval must be positive")),
                Some(secs) if secs > MAX_POLL_INTERVAL_SECS => problems.push(format!(
                    "targets[{i}]: poll interval {secs}s exceeds the maximum of {MAX_POLL_INTERVAL_SECS}s"
                )),
                _ => {}
            }
            if !seen.insert(watch.clone()) {
                problems.push(format!("targets[{i}]: duplicate target {watch}"));
            }
        }

        if let SinkConfig::Webhook { url, .. } = &self.sink {
            if let Err(e) = WebhookSink::new(url.as_str()) {
                problems.push(format!("sink: {e}"));
            }
        }
        problems
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let problems = self.problems();
        if !problems.is_empty() {
            bail!("invalid configuration:\n  {}", problems.join("\n  "));
        }
        Ok(())
    }

    /// Distinct bucket names, sorted.
    pub fn buckets(&self) -> BTreeSet<&str> {
        self.targets.iter().map(|t| t.bucket.as_str()).collect()
    }

    /// One spec per target, with `poll_interval` overriding every target's
    /// interval when given.
    pub fn watch_specs(&self, poll_interval: Option<u64>) -> Vec<WatchSpec> {
        self.targets
            .iter()
            .map(|t| {
                let mut config = self.defaults.clone();
                if let Some(secs) = poll_interval.or(t.poll_interval_secs) {
                    config.poll_interval_secs = secs;
                }
                WatchSpec {
                    target: t.target(),
                    filter: t.filter(),
                    config,
                }
            })
            .collect()
    }

    pub fn build_source(&self) -> anyhow::Result<Arc<dyn ObjectSource>> {
        let buckets = self.buckets();
        let source = match &self.backend {
            BackendConfig::Gcs => ObjectStoreSource::gcs(buckets)?,
            BackendConfig::S3 { region, endpoint } => {
                ObjectStoreSource::s3(buckets, region.as_deref(), endpoint.as_deref())?
            }
            BackendConfig::Local { root } => ObjectStoreSource::local(root, buckets)?,
            BackendConfig::Memory => ObjectStoreSource::in_memory(buckets),
        };
        Ok(Arc::new(source))
    }

    pub fn build_sink(&self) -> anyhow::Result<BuiltSink> {
        let built = match &self.sink {
            SinkConfig::Log => BuiltSink {
                sink: Arc::new(LogSink),
                events: None,
            },
            SinkConfig::Stdout { capacity } => {
                let (sink, events) = ChannelSink::new(*capacity);
                BuiltSink {
                    sink: Arc::new(sink),
                    events: Some(events),
                }
            }
            SinkConfig::Webhook { url, timeout_secs } => {
                let sink = match timeout_secs {
                    Some(secs) => WebhookSink::with_timeout(url.as_str(), Duration::from_secs(*secs))?,
                    None => WebhookSink::new(url.as_str())?,
                };
                BuiltSink {
                    sink: Arc::new(sink),
                    events: None,
                }
            }
        };
        Ok(built)
    }

    /// The configured target covering `bucket`/`key`, preferring the
    /// longest prefix.
    pub fn target_for(&self, bucket: &str, key: &str) -> Option<&TargetConfig> {
        self.targets
            .iter()
            .filter(|t| t.bucket == bucket && key.starts_with(&t.prefix))
            .max_by_key(|t| t.prefix.len())
    }

    pub fn open_store(&self) -> anyhow::Result<FileSnapshotStore> {
        FileSnapshotStore::open(&self.state_dir)
            .with_context(|| format!("opening state directory {}", self.state_dir.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        state_dir = "/var/lib/bucket-watcher"

        [defaults]
        poll_interval_secs = 60

        [defaults.retry]
        max_attempts = 3

        [backend]
        kind = "s3"
        region = "eu-west-1"
        endpoint = "http://localhost:9000"

        [sink]
        kind = "webhook"
        url = "https://example.com/hook"

        [[targets]]
        bucket = "incoming"
        prefix = "scans/"
        include_suffixes = [".pdf"]

        [[targets]]
        bucket = "archive"
        poll_interval_secs = 3600
    "#;

    #[test]
    fn parses_full_example() {
        let file = WatcherFile::parse(EXAMPLE).unwrap();
        assert_eq!(file.state_dir, PathBuf::from("/var/lib/bucket-watcher"));
        assert_eq!(file.defaults.poll_interval_secs, 60);
        assert_eq!(file.defaults.retry.max_attempts, 3);
        assert_eq!(file.defaults.cycle_timeout_secs, 120);
        assert_eq!(
            file.backend,
            BackendConfig::S3 {
                region: Some("eu-west-1".into()),
                endpoint: Some("http://localhost:9000".into()),
            }
        );
        assert!(matches!(file.sink, SinkConfig::Webhook { .. }));
        assert_eq!(file.targets.len(), 2);
        assert_eq!(file.targets[0].filter(), KeyFilter::suffixes([".pdf"]));
        assert!(file.problems().is_empty());
    }

    #[test]
    fn minimal_file_uses_defaults() {
        let file = WatcherFile::parse(
            r#"
            state_dir = "state"
            [[targets]]
            bucket = "b"
            "#,
        )
        .unwrap();
        assert_eq!(file.backend, BackendConfig::Gcs);
        assert_eq!(file.sink, SinkConfig::Log);
        assert_eq!(file.defaults, WatchConfig::default());
        assert_eq!(file.targets[0].target(), WatchTarget::bucket("b"));
    }

    #[test]
    fn unknown_backend_fails_to_parse() {
        let err = WatcherFile::parse(
            r#"
            state_dir = "state"
            [backend]
            kind = "ftp"
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn problems_are_collected() {
        let file = WatcherFile::parse(
            r#"
            state_dir = "state"
            [defaults]
            poll_interval_secs = 0
            [[targets]]
            bucket = ""
            [[targets]]
            bucket = "b"
            prefix = "p/"
            [[targets]]
            bucket = "b"
            prefix = "p/"
            poll_interval_secs = 0
            "#,
        )
        .unwrap();

        let problems = file.problems();
        assert!(problems.iter().any(|p| p.starts_with("defaults:")));
        assert!(problems.iter().any(|p| p.starts_with("targets[0]:")));
        assert!(problems.iter().any(|p| p.contains("duplicate target")));
        assert!(problems.iter().any(|p| p.contains("targets[2]: poll interval")));
        assert!(file.validate().is_err());
    }

    #[test]
    fn oversized_target_interval_is_reported() {
        let file = WatcherFile::parse(
            r#"
            state_dir = "state"
            [[targets]]
            bucket = "b"
            poll_interval_secs = 99999999999
            "#,
        )
        .unwrap();
        assert!(file.problems().iter().any(|p| p.contains("exceeds the maximum")));
    }

    #[test]
    fn stdout_sink_hands_back_its_queue() {
        let file = WatcherFile::parse(
            r#"
            state_dir = "state"
            [sink]
            kind = "stdout"
            [[targets]]
            bucket = "b"
            "#,
        )
        .unwrap();
        assert_eq!(
            file.sink,
            SinkConfig::Stdout {
                capacity: DEFAULT_STDOUT_CAPACITY
            }
        );
        let built = file.build_sink().unwrap();
        assert_eq!(built.sink.name(), "channel");
        assert!(built.events.is_some());

        let log = WatcherFile::parse("state_dir = \"s\"").unwrap().build_sink().unwrap();
        assert!(log.events.is_none());
    }

    #[test]
    fn target_for_prefers_longest_prefix() {
        let file = WatcherFile::parse(
            r#"
            state_dir = "state"
            [[targets]]
            bucket = "b"
            [[targets]]
            bucket = "b"
            prefix = "scans/"
            "#,
        )
        .unwrap();
        assert_eq!(file.target_for("b", "scans/x.pdf").unwrap().prefix, "scans/");
        assert_eq!(file.target_for("b", "other/x").unwrap().prefix, "");
        assert!(file.target_for("c", "scans/x.pdf").is_none());
    }

    #[test]
    fn empty_target_list_is_invalid() {
        let file = WatcherFile::parse(r#"state_dir = "state""#).unwrap();
        assert_eq!(file.problems(), vec!["no targets configured".to_string()]);
    }

    #[test]
    fn bad_webhook_url_is_reported() {
        let file = WatcherFile::parse(
            r#"
            state_dir = "state"
            [sink]
            kind = "webhook"
            url = "not a url"
            [[targets]]
            bucket = "b"
            "#,
        )
        .unwrap();
        assert!(file.problems().iter().any(|p| p.starts_with("sink:")));
    }

    #[test]
    fn interval_overrides() {
        let file = WatcherFile::parse(EXAMPLE).unwrap();

        let specs = file.watch_specs(None);
        assert_eq!(specs[0].config.poll_interval_secs, 60);
        assert_eq!(specs[1].config.poll_interval_secs, 3600);

        let forced = file.watch_specs(Some(5));
        assert!(forced.iter().all(|s| s.config.poll_interval_secs == 5));
    }

    #[test]
    fn buckets_are_deduplicated() {
        let file = WatcherFile::parse(
            r#"
            state_dir = "state"
            [[targets]]
            bucket = "b"
            prefix = "x/"
            [[targets]]
            bucket = "b"
            prefix = "y/"
            [[targets]]
            bucket = "a"
            "#,
        )
        .unwrap();
        assert_eq!(file.buckets().into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = WatcherFile::load(Path::new("/nonexistent/bucket-watcher.toml")).unwrap_err();
        assert!(err.to_string().contains("reading config file"));
    }

    #[test]
    fn local_backend_requires_bucket_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("present")).unwrap();
        let mut file = WatcherFile::parse(
            r#"
            state_dir = "state"
            [[targets]]
            bucket = "present"
            "#,
        )
        .unwrap();
        file.backend = BackendConfig::Local {
            root: dir.path().to_path_buf(),
        };
        assert!(file.build_source().is_ok());

        file.targets[0].bucket = "absent".into();
        assert!(file.build_source().is_err());
    }
}
