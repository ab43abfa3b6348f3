//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use mdb_harvest::cache::ContentCache;
use mdb_harvest::crawler::{
    build_http_client, ChallengeSolver, ChallengeStage, FetchSettings, Fetcher, Sleeper,
};
use mdb_harvest::extract::FilmRecord;
use mdb_harvest::storage::{ErrorEntry, Storage, StorageResult};
use mdb_harvest::{CrawlProgress, HarvestError, ItemId, Partition};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Sleeper that records requested durations and returns immediately
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// How a [`ScriptedSolver`] answers
#[derive(Debug, Clone, Copy)]
pub enum SolverMode {
    Solve,
    Unresolved,
    Malformed,
}

/// Challenge solver that counts its calls and answers per its mode
#[derive(Debug, Clone)]
pub struct ScriptedSolver {
    pub calls: Arc<AtomicUsize>,
    mode: SolverMode,
}

impl ScriptedSolver {
    pub fn new(mode: SolverMode) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            mode,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChallengeSolver for ScriptedSolver {
    async fn solve(&self, page_url: &Url, _body: &str) -> mdb_harvest::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            SolverMode::Solve => Ok(()),
            SolverMode::Unresolved => Err(HarvestError::ChallengeUnresolved {
                stage: ChallengeStage::Polling,
                reason: "status failed".to_string(),
            }),
            SolverMode::Malformed => Err(HarvestError::ChallengeMalformed {
                url: page_url.to_string(),
                missing: "key",
            }),
        }
    }
}

/// Fetch settings without pacing and with short timeouts
pub fn fast_settings() -> FetchSettings {
    FetchSettings {
        max_attempts: 3,
        max_pacing_delay: Duration::ZERO,
        request_timeout: Duration::from_secs(2),
        recovery_delay: Duration::from_secs(10),
        challenge_marker: "captchaimg".to_string(),
        user_agent: "mdb-harvest-tests".to_string(),
        force_download: false,
    }
}

pub fn test_fetcher(
    cache: ContentCache,
    settings: FetchSettings,
    solver: ScriptedSolver,
    sleeper: Arc<RecordingSleeper>,
) -> Fetcher {
    let client = build_http_client(&settings).expect("Failed to build client");
    Fetcher::new(client, cache, settings, Box::new(solver), sleeper)
}

/// Store double keeping everything in memory
#[derive(Debug, Default)]
pub struct MemoryStorage {
    pub records: HashMap<ItemId, FilmRecord>,
    pub upserts: Vec<ItemId>,
    pub errors: Vec<ErrorEntry>,
    pub progress: HashMap<Partition, CrawlProgress>,
    pub progress_saves: usize,
}

impl MemoryStorage {
    pub fn with_progress(progress: CrawlProgress) -> Self {
        let mut storage = Self::default();
        storage
            .progress
            .insert(progress.partition.clone(), progress);
        storage
    }
}

impl Storage for MemoryStorage {
    type Record = FilmRecord;

    fn record_exists(&self, id: ItemId) -> StorageResult<bool> {
        Ok(self.records.contains_key(&id))
    }

    fn upsert(&mut self, record: &FilmRecord) -> StorageResult<()> {
        self.upserts.push(record.id);
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    fn log_error(&mut self, entry: &ErrorEntry) -> StorageResult<()> {
        self.errors.push(entry.clone());
        Ok(())
    }

    fn load_progress(&self, partition: &Partition) -> StorageResult<Option<CrawlProgress>> {
        Ok(self.progress.get(partition).cloned())
    }

    fn save_progress(&mut self, progress: &CrawlProgress) -> StorageResult<()> {
        self.progress_saves += 1;
        self.progress
            .insert(progress.partition.clone(), progress.clone());
        Ok(())
    }

    fn list_progress(&self) -> StorageResult<Vec<CrawlProgress>> {
        let mut all: Vec<_> = self.progress.values().cloned().collect();
        all.sort_by(|a, b| a.partition.cmp(&b.partition));
        Ok(all)
    }
}

/// Listing path template used by the crawl tests
pub const LISTING_PATH: &str = "/list/{partition}/page/{page}/";

/// Detail path template used by the crawl tests
pub const DETAIL_PATH: &str = "/film/{id}/";

/// Renders a listing page in the catalog's markup
///
/// `total_items` of `None` leaves out the item counter.
pub fn listing_html(partition: &str, total_items: Option<u64>, total_pages: u32, ids: &[i64]) -> String {
    let mut html = String::from("<html><body>\n");

    if let Some(total) = total_items {
        html.push_str(&format!(
            "<div class=\"pagesFromTo\">1—{} из {}</div>\n",
            ids.len(),
            total
        ));
    }

    if total_pages > 1 {
        html.push_str(&format!(
            "<ul class=\"list\"><li class=\"arr\"><a href=\"/list/{}/page/2/\">&raquo;</a></li>\
             <li class=\"arr\"><a href=\"/list/{}/page/{}/\">&raquo;&raquo;</a></li></ul>\n",
            partition, partition, total_pages
        ));
    }

    for id in ids {
        html.push_str(&format!(
            "<div class=\"item\"><div class=\"name\"><a href=\"/film/{}/\">Film {}</a></div></div>\n",
            id, id
        ));
    }

    html.push_str("</body></html>");
    html
}

/// Renders a minimal film detail page
pub fn film_html(id: i64) -> String {
    format!(
        "<html><body><h1 class=\"moviename-big\">Film {}</h1>\
         <table class=\"info\"><tr><td class=\"type\">год</td><td>1999</td></tr></table>\
         </body></html>",
        id
    )
}

/// Renders a challenge page whose image and form live on the same server
pub fn challenge_html() -> String {
    r#"<html><body>
        <form action="/checkcaptcha" method="get">
            <img src="/captchaimg?aW1n">
            <input type="hidden" name="key" value="00aa11bb">
            <input type="hidden" name="retpath" value="/film/1/_retpath">
            <input type="text" name="rep">
        </form>
    </body></html>"#
        .to_string()
}
