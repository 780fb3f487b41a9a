//! Sync run orchestration
//!
//! A run goes through the phases listed in [`SyncPhase`]. Any error before
//! entry processing is fatal and reported as a [`RunFailure`] naming the
//! phase. Errors while processing an entry only fail that entry.

use crate::events::{EntryReport, SyncEvent, SyncObserver, TracingObserver};
use crate::fetcher::Fetcher;
use crate::policy::{should_continue, Prompt};
use crate::tool::LocalToolSource;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use mapsync_config::Config;
use mapsync_network::{
    transport_for, CatalogClient, LineIssue, Repository, Transport, TransportConfig,
};
use mapsync_sync::{AssetLayout, HashCache, HashStore, Reconciler};
use mapsync_types::{
    Cancellable, CatalogEntry, EntryOutcome, Error, ProgressReporter, Result, SyncPhase, SyncTally,
    ToolMetadata, Verdict,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Unique run identifier
    pub run_id: Uuid,
    /// Wall clock start of the run
    pub started_at: DateTime<Utc>,
    /// Resolved repository location
    pub repository: String,
    /// Local tool description
    pub local_tool: ToolMetadata,
    /// Reference tool description
    pub remote_tool: ToolMetadata,
    /// Counters over all entries
    pub tally: SyncTally,
    /// Per-entry results, sorted by name
    pub entries: Vec<EntryReport>,
    /// Skipped catalog lines
    pub issues: Vec<LineIssue>,
    /// Total run time
    pub duration: Duration,
    /// Whether fetches were skipped
    pub dry_run: bool,
}

/// A fatal run error together with the counts reached so far
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{phase} failed: {error}")]
pub struct RunFailure {
    /// Phase in which the run stopped
    pub phase: SyncPhase,
    /// Cause
    pub error: Error,
    /// Entries settled before the failure
    pub tally: SyncTally,
}

impl RunFailure {
    /// Failure in `phase` with the given partial tally
    pub fn new(phase: SyncPhase, error: Error, tally: SyncTally) -> Self {
        Self {
            phase,
            error,
            tally,
        }
    }
}

/// Handle that cancels a running [`SyncDriver`] from another task
#[derive(Debug, Clone)]
pub struct CancelHandle(CancellationToken);

impl Cancellable for CancelHandle {
    fn cancel(&self) {
        self.0.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Per-entry result before it is wrapped into a report
struct Settled {
    verdict: Option<Verdict>,
    url: Option<String>,
    outcome: EntryOutcome,
}

/// Runs one synchronization against a repository
pub struct SyncDriver {
    config: Arc<Config>,
    client: CatalogClient,
    fetcher: Fetcher,
    reconciler: Reconciler,
    tool_source: LocalToolSource,
    prompt: Arc<dyn Prompt>,
    observer: Arc<dyn SyncObserver>,
    cancel: CancellationToken,
}

impl SyncDriver {
    /// Create a driver using `transport` for every repository request.
    ///
    /// Loads the persisted digest memo when `sync.hash_cache_file` is set.
    pub async fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        prompt: Arc<dyn Prompt>,
    ) -> Result<Self> {
        config.validate()?;

        let sync = &config.sync;
        let chunk_size = sync.chunk_size.get();
        let hashes = match &sync.hash_cache_file {
            Some(path) => {
                let cache = HashCache::load(path, sync.hash_algorithm).await?;
                debug!("Loaded {} memoized digests from {}", cache.len(), path.display());
                HashStore::with_cache(cache, chunk_size)
            }
            None => HashStore::new(sync.hash_algorithm, chunk_size),
        };

        let layout = AssetLayout::from_config(sync);
        let client = CatalogClient::from_config(
            Arc::clone(&transport),
            &config.repository,
            &config.tool,
            layout.artifact_extension(),
        );
        let cancel = CancellationToken::new();
        let fetcher = Fetcher::new(transport, chunk_size)
            .with_algorithm(sync.hash_algorithm)
            .with_cancellation(cancel.clone());
        let tool_source = LocalToolSource::from_config(&config.tool, &sync.root);

        Ok(Self {
            client,
            fetcher,
            reconciler: Reconciler::new(layout, Arc::new(hashes)),
            tool_source,
            prompt,
            observer: Arc::new(TracingObserver),
            cancel,
            config: Arc::new(config),
        })
    }

    /// Create a driver with the transport matching `repository.base_url`
    pub async fn from_config(config: Config, prompt: Arc<dyn Prompt>) -> Result<Self> {
        let transport_config =
            TransportConfig::from_network(&config.network, config.sync.chunk_size.get());
        let transport = transport_for(&config.repository.base_url, &transport_config)?;
        Self::new(config, transport, prompt).await
    }

    /// Report download progress to `reporter`
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.fetcher = self.fetcher.with_reporter(reporter);
        self
    }

    /// Send run events to `observer` instead of the log
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Tie the run to an external cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.fetcher = self.fetcher.with_cancellation(token.clone());
        self.cancel = token;
        self
    }

    /// Override where the local tool description comes from
    #[must_use]
    pub fn with_tool_source(mut self, source: LocalToolSource) -> Self {
        self.tool_source = source;
        self
    }

    /// Handle for cancelling the run
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// Configuration the driver was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute the run
    pub async fn run(&self) -> std::result::Result<SyncReport, RunFailure> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        info!("Starting sync run {}", run_id);

        let local_tool = self
            .guarded(SyncPhase::LocalMetadata, self.tool_source.inspect())
            .await?;
        self.observer.on_event(&SyncEvent::LocalTool(&local_tool));

        let repository = Repository::resolve(
            &self.config.repository.base_url,
            &self.config.repository.branch,
            &local_tool,
        )
        .map_err(|e| RunFailure::new(SyncPhase::ResolveRepository, e, SyncTally::new()))?;
        self.observer
            .on_event(&SyncEvent::RepositoryResolved(&repository));

        let remote_tool = self
            .guarded(
                SyncPhase::RemoteMetadata,
                self.client.fetch_tool_metadata(&repository),
            )
            .await?;
        self.observer.on_event(&SyncEvent::RemoteTool(&remote_tool));

        if !local_tool.same_source(&remote_tool) {
            self.confirm_mismatch(&local_tool, &remote_tool).await?;
        }

        let catalog = self
            .guarded(SyncPhase::Catalog, self.client.fetch_catalog(&repository))
            .await?;
        self.observer.on_event(&SyncEvent::CatalogLoaded {
            entries: catalog.len(),
            issues: catalog.issues.len(),
        });
        for issue in &catalog.issues {
            self.observer.on_event(&SyncEvent::CatalogIssue(issue));
        }

        let concurrency = self.config.sync.concurrency.get();
        let mut tally = SyncTally::new();
        let mut entries = Vec::with_capacity(catalog.len());
        let mut reports = stream::iter(catalog.entries.iter().cloned())
            .map(|entry| self.process_entry(&repository, entry))
            .buffered(concurrency);
        while let Some(report) = reports.next().await {
            tally.record(&report.outcome);
            self.observer.on_event(&SyncEvent::Entry(&report));
            entries.push(report);
        }
        drop(reports);

        self.save_hash_cache().await;

        if self.cancel.is_cancelled() {
            warn!("Sync run {} cancelled", run_id);
            return Err(RunFailure::new(SyncPhase::Entries, Error::Cancelled, tally));
        }

        info!("Sync run {} finished: {}", run_id, tally);
        Ok(SyncReport {
            run_id,
            started_at,
            repository: repository.url(),
            local_tool,
            remote_tool,
            tally,
            entries,
            issues: catalog.issues,
            duration: start.elapsed(),
            dry_run: self.config.sync.dry_run,
        })
    }

    async fn guarded<T, F>(&self, phase: SyncPhase, operation: F) -> std::result::Result<T, RunFailure>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                Err(RunFailure::new(phase, Error::Cancelled, SyncTally::new()))
            }
            result = operation => {
                result.map_err(|error| RunFailure::new(phase, error, SyncTally::new()))
            }
        }
    }

    async fn confirm_mismatch(
        &self,
        local: &ToolMetadata,
        remote: &ToolMetadata,
    ) -> std::result::Result<(), RunFailure> {
        let versions_differ = !local.same_version(remote);
        self.observer.on_event(&SyncEvent::ToolMismatch {
            local,
            remote,
            versions_differ,
        });
        if !versions_differ {
            return Ok(());
        }

        let question = format!(
            "Local tool version {} differs from repository version {}. Continue anyway?",
            local.version(),
            remote.version()
        );
        let policy = self.config.display.reply;
        let prompt = Arc::clone(&self.prompt);
        let answer = self
            .guarded(SyncPhase::Confirmation, async move {
                tokio::task::spawn_blocking(move || should_continue(policy, &question, &*prompt))
                    .await
                    .map_err(|e| Error::other(format!("Prompt task failed: {}", e)))?
            })
            .await?;

        self.observer
            .on_event(&SyncEvent::ConfirmationAnswered(answer));
        if answer {
            Ok(())
        } else {
            Err(RunFailure::new(
                SyncPhase::Confirmation,
                Error::Declined,
                SyncTally::new(),
            ))
        }
    }

    async fn process_entry(&self, repository: &Repository, entry: CatalogEntry) -> EntryReport {
        let start = Instant::now();
        let settled = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Settled {
                verdict: None,
                url: None,
                outcome: EntryOutcome::Cancelled,
            },
            settled = self.settle(repository, &entry) => settled,
        };

        EntryReport {
            entry,
            verdict: settled.verdict,
            outcome: settled.outcome,
            url: settled.url,
            duration: start.elapsed(),
        }
    }

    async fn settle(&self, repository: &Repository, entry: &CatalogEntry) -> Settled {
        let assessment = match self.reconciler.evaluate(entry).await {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!("{}: evaluation failed: {}", entry.name, e);
                return Settled {
                    verdict: None,
                    url: None,
                    outcome: EntryOutcome::Failed {
                        message: e.to_string(),
                    },
                };
            }
        };

        let verdict = assessment.verdict;
        if verdict == Verdict::NotPresent {
            info!(
                "{} not found at {}",
                entry.name,
                assessment.pair.source_path.display()
            );
        }
        if let Some(outcome) = EntryOutcome::from_verdict(verdict) {
            return Settled {
                verdict: Some(verdict),
                url: None,
                outcome,
            };
        }

        let url = repository.resource(&self.reconciler.layout().payload_resource(&entry.name));
        if self.config.sync.dry_run {
            return Settled {
                verdict: Some(verdict),
                url: Some(url),
                outcome: EntryOutcome::WouldUpdate,
            };
        }

        let expected = self
            .config
            .sync
            .verify_artifacts
            .then_some(entry.artifact_hash.as_str());
        let outcome = match self
            .fetcher
            .install_compressed(&url, &assessment.pair.artifact_path, expected)
            .await
        {
            Ok(install) => {
                self.reconciler.hashes().invalidate(&install.destination);
                EntryOutcome::Updated {
                    bytes: install.installed_bytes,
                }
            }
            Err(Error::Cancelled) => EntryOutcome::Cancelled,
            Err(e) => {
                warn!("{}: update failed: {}", entry.name, e);
                EntryOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };

        Settled {
            verdict: Some(verdict),
            url: Some(url),
            outcome,
        }
    }

    async fn save_hash_cache(&self) {
        if let Some(path) = &self.config.sync.hash_cache_file {
            if let Err(e) = self.reconciler.hashes().save(path).await {
                warn!("Failed to save digest cache {}: {}", path.display(), e);
            }
        }
    }
}

impl std::fmt::Debug for SyncDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncDriver")
            .field("repository", &self.config.repository.base_url)
            .field("tool_source", &self.tool_source)
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DeclinePrompt;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use mapsync_sync::digest_bytes;
    use mapsync_types::{ContentMode, ErrorKind, HashAlgorithm, ReplyMode};
    use std::io::Write;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const SOURCE_HASH: &str = "0a1b2c3d4e5f";

    fn md5(data: &[u8]) -> String {
        digest_bytes(data, HashAlgorithm::Md5, ContentMode::Binary)
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn write(path: &Path, data: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    struct Fixture {
        _dir: TempDir,
        mirror: std::path::PathBuf,
        root: std::path::PathBuf,
    }

    impl Fixture {
        fn new(remote_version: &str, remote_source: &str) -> Self {
            let dir = TempDir::new().unwrap();
            let mirror = dir.path().join("mirror");
            let root = dir.path().join("game");
            write(
                &mirror.join("2.3/UFO2MAP"),
                format!("ufo2map version {}\nsource hash: {}\n", remote_version, remote_source)
                    .as_bytes(),
            );
            write(
                &root.join("ufo2map.txt"),
                format!("ufo2map version 2.3\nsource hash: {}\n", SOURCE_HASH).as_bytes(),
            );
            Self {
                _dir: dir,
                mirror,
                root,
            }
        }

        fn catalog(&self, text: &str) {
            write(&self.mirror.join("2.3/MAPS"), text.as_bytes());
        }

        fn payload(&self, name: &str, data: &[u8]) {
            write(&self.mirror.join(format!("2.3/{}.bsp.gz", name)), &gzip(data));
        }

        fn config(&self) -> Config {
            let mut config = Config::default();
            config.repository.base_url = self.mirror.display().to_string();
            config.sync.root = self.root.clone();
            config.tool.metadata_file = Some(self.root.join("ufo2map.txt"));
            config
        }
    }

    struct RecordingObserver(Mutex<Vec<String>>);

    impl SyncObserver for RecordingObserver {
        fn on_event(&self, event: &SyncEvent<'_>) {
            if let SyncEvent::Entry(report) = event {
                self.0.lock().unwrap().push(report.entry.name.clone());
            }
        }
    }

    #[tokio::test]
    async fn test_run_updates_stale_entry() {
        let fixture = Fixture::new("2.3", SOURCE_HASH);
        write(&fixture.root.join("maps/a.map"), b"source a");
        fixture.catalog(&format!(
            "maps/a {} {}\n",
            md5(b"source a"),
            md5(b"artifact a")
        ));
        fixture.payload("maps/a", b"artifact a");

        let driver = SyncDriver::from_config(fixture.config(), Arc::new(DeclinePrompt))
            .await
            .unwrap();
        let report = driver.run().await.unwrap();

        assert_eq!(report.tally.updated, 1);
        assert_eq!(report.repository, format!("{}/2.3", fixture.mirror.display()));
        assert_eq!(
            std::fs::read(fixture.root.join("maps/a.bsp")).unwrap(),
            b"artifact a"
        );
        assert_eq!(report.entries[0].verdict, Some(Verdict::Stale));
    }

    #[tokio::test]
    async fn test_entries_reported_in_name_order() {
        let fixture = Fixture::new("2.3", SOURCE_HASH);
        let mut catalog = String::new();
        for name in ["c", "a", "b", "e", "d"] {
            let source = format!("source {}", name);
            write(&fixture.root.join(format!("{}.map", name)), source.as_bytes());
            catalog.push_str(&format!(
                "{} {} {}\n",
                name,
                md5(source.as_bytes()),
                md5(name.as_bytes())
            ));
            fixture.payload(name, name.as_bytes());
        }
        fixture.catalog(&catalog);

        let mut config = fixture.config();
        config.sync.concurrency = mapsync_types::Concurrency::new(4).unwrap();
        let observer = Arc::new(RecordingObserver(Mutex::new(Vec::new())));
        let driver = SyncDriver::from_config(config, Arc::new(DeclinePrompt))
            .await
            .unwrap()
            .with_observer(observer.clone());
        let report = driver.run().await.unwrap();

        assert_eq!(report.tally.updated, 5);
        assert_eq!(*observer.0.lock().unwrap(), vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_version_mismatch_declined() {
        let fixture = Fixture::new("2.4", "ffffffff");
        fixture.catalog("");
        let mut config = fixture.config();
        config.display.reply = ReplyMode::No;

        let driver = SyncDriver::from_config(config, Arc::new(DeclinePrompt))
            .await
            .unwrap();
        let failure = driver.run().await.unwrap_err();

        assert_eq!(failure.phase, SyncPhase::Confirmation);
        assert_eq!(failure.error.kind(), ErrorKind::Declined);
        assert_eq!(failure.tally.total(), 0);
    }

    #[tokio::test]
    async fn test_source_mismatch_same_version_continues() {
        let fixture = Fixture::new("2.3", "ffffffff");
        fixture.catalog("");
        let mut config = fixture.config();
        config.display.reply = ReplyMode::No;

        let driver = SyncDriver::from_config(config, Arc::new(DeclinePrompt))
            .await
            .unwrap();
        assert!(driver.run().await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_catalog_is_fatal() {
        let fixture = Fixture::new("2.3", SOURCE_HASH);
        let driver = SyncDriver::from_config(fixture.config(), Arc::new(DeclinePrompt))
            .await
            .unwrap();
        let failure = driver.run().await.unwrap_err();

        assert_eq!(failure.phase, SyncPhase::Catalog);
        assert_eq!(failure.error.kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_tree_alone() {
        let fixture = Fixture::new("2.3", SOURCE_HASH);
        write(&fixture.root.join("a.map"), b"source a");
        fixture.catalog(&format!("a {} {}\n", md5(b"source a"), md5(b"artifact a")));
        fixture.payload("a", b"artifact a");
        let mut config = fixture.config();
        config.sync.dry_run = true;

        let driver = SyncDriver::from_config(config, Arc::new(DeclinePrompt))
            .await
            .unwrap();
        let report = driver.run().await.unwrap();

        assert_eq!(report.tally.would_update, 1);
        assert!(report.dry_run);
        assert!(!fixture.root.join("a.bsp").exists());
    }

    #[tokio::test]
    async fn test_failed_entry_does_not_stop_run() {
        let fixture = Fixture::new("2.3", SOURCE_HASH);
        write(&fixture.root.join("a.map"), b"source a");
        write(&fixture.root.join("b.map"), b"source b");
        fixture.catalog(&format!(
            "a {} {}\nb {} {}\n",
            md5(b"source a"),
            md5(b"artifact a"),
            md5(b"source b"),
            md5(b"artifact b")
        ));
        fixture.payload("b", b"artifact b");

        let driver = SyncDriver::from_config(fixture.config(), Arc::new(DeclinePrompt))
            .await
            .unwrap();
        let report = driver.run().await.unwrap();

        assert_eq!(report.tally.failed, 1);
        assert_eq!(report.tally.updated, 1);
        assert!(matches!(
            report.entries[0].outcome,
            EntryOutcome::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fixture = Fixture::new("2.3", SOURCE_HASH);
        fixture.catalog("");
        let driver = SyncDriver::from_config(fixture.config(), Arc::new(DeclinePrompt))
            .await
            .unwrap();
        let handle = driver.cancel_handle();
        handle.cancel();

        let failure = driver.run().await.unwrap_err();
        assert!(handle.is_cancelled());
        assert_eq!(failure.phase, SyncPhase::LocalMetadata);
        assert_eq!(failure.error, Error::Cancelled);
    }

    #[tokio::test]
    async fn test_hash_cache_persisted() {
        let fixture = Fixture::new("2.3", SOURCE_HASH);
        write(&fixture.root.join("a.map"), b"source a");
        write(&fixture.root.join("a.bsp"), b"artifact a");
        fixture.catalog(&format!("a {} {}\n", md5(b"source a"), md5(b"artifact a")));
        let cache_file = fixture.root.join("cache/digests.json");
        let mut config = fixture.config();
        config.sync.hash_cache_file = Some(cache_file.clone());

        let driver = SyncDriver::from_config(config, Arc::new(DeclinePrompt))
            .await
            .unwrap();
        let report = driver.run().await.unwrap();

        assert_eq!(report.tally.up_to_date, 1);
        assert!(cache_file.exists());
    }

    #[test]
    fn test_run_failure_display() {
        let failure = RunFailure::new(
            SyncPhase::Catalog,
            Error::status(404, "http://mirror/2.3/MAPS"),
            SyncTally::new(),
        );
        assert!(failure.to_string().starts_with("catalog retrieval failed: "));
    }
}
