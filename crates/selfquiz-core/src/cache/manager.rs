use std::sync::Arc;

use futures::future;
use reqwest::Url;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::CacheError;
use super::storage::{Cache, CacheStorage};
use crate::config::Config;
use crate::network::{Destination, Fetcher, Request, Response};

/// Caching strategy, chosen from the shape of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Top-level page loads get the cached application shell.
    NavigationShell,
    /// Quiz data: answer from cache, refresh in the background.
    StaleWhileRevalidate,
    /// Fonts: answer from cache, store network results.
    CacheFirstStore,
    /// Everything else: answer from cache, fall back to network.
    CacheFirst,
}

impl Strategy {
    pub fn for_request(request: &Request) -> Self {
        if request.is_navigation() {
            Strategy::NavigationShell
        } else if request.url.ends_with(".json") {
            Strategy::StaleWhileRevalidate
        } else if request.destination == Destination::Font {
            Strategy::CacheFirstStore
        } else {
            Strategy::CacheFirst
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
}

/// The answer to an intercepted request.
///
/// When the answer came from the data cache, `revalidation` is the
/// background refresh that was started for it. Hosts that need the cache
/// to be up to date before moving on (the service worker's `waitUntil`)
/// call [`Intercepted::settled`].
#[derive(Debug)]
pub struct Intercepted {
    pub response: Response,
    pub source: ResponseSource,
    pub revalidation: Option<JoinHandle<()>>,
}

impl Intercepted {
    fn from_cache(response: Response) -> Self {
        Self {
            response,
            source: ResponseSource::Cache,
            revalidation: None,
        }
    }

    fn from_network(response: Response) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
            revalidation: None,
        }
    }

    /// Wait for any background refresh, then hand back the response.
    pub async fn settled(self) -> Response {
        if let Some(task) = self.revalidation {
            if let Err(e) = task.await {
                warn!(error = %e, "Background revalidation task failed");
            }
        }
        self.response
    }
}

/// Serves requests from cache namespaces according to [`Strategy`].
pub struct CacheManager<F> {
    storage: Arc<CacheStorage>,
    fetcher: Arc<F>,
    origin: Url,
    static_cache: String,
    data_cache: String,
    font_cache: String,
    data_max_entries: usize,
    font_max_entries: usize,
    shell_url: String,
    assets: Vec<String>,
}

impl<F: Fetcher> CacheManager<F> {
    pub fn new(config: &Config, storage: Arc<CacheStorage>, fetcher: Arc<F>) -> Result<Self, CacheError> {
        let origin = Url::parse(&config.origin).map_err(|e| CacheError::InvalidUrl {
            url: config.origin.clone(),
            reason: e.to_string(),
        })?;
        let shell_url = resolve(&origin, &config.shell_url)?;
        let assets = config
            .assets
            .iter()
            .map(|asset| resolve(&origin, asset))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            storage,
            fetcher,
            origin,
            static_cache: config.static_cache.clone(),
            data_cache: config.data_cache.clone(),
            font_cache: config.font_cache.clone(),
            data_max_entries: config.data_max_entries,
            font_max_entries: config.font_max_entries,
            shell_url,
            assets,
        })
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    /// Absolute form of `url`, relative to the application origin.
    pub fn resolve(&self, url: &str) -> Result<String, CacheError> {
        resolve(&self.origin, url)
    }

    // ===== Lifecycle =====

    /// Precache the static asset manifest.
    ///
    /// Every asset is fetched before anything is stored; one failed fetch
    /// or non-200 response fails the install and leaves storage untouched.
    pub async fn install(&self) -> Result<usize, CacheError> {
        info!(cache = %self.static_cache, assets = self.assets.len(), "Installing static assets");

        let fetches = self.assets.iter().map(|url| self.precache_fetch(url));
        let responses = future::try_join_all(fetches).await?;

        let cache = self.storage.open(&self.static_cache).await;
        for (url, response) in self.assets.iter().zip(responses) {
            cache.put(url, response).await;
        }

        let count = cache.len().await;
        info!(cache = %self.static_cache, count, "Static assets precached");
        Ok(count)
    }

    async fn precache_fetch(&self, url: &str) -> Result<Response, CacheError> {
        let response = self
            .fetcher
            .fetch(&Request::get(url))
            .await
            .map_err(|e| CacheError::InstallFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if !response.is_cacheable() {
            return Err(CacheError::InstallFailed {
                url: url.to_string(),
                reason: format!("status {}", response.status),
            });
        }
        Ok(response)
    }

    /// Delete every namespace outside the allow-list. Returns the deleted
    /// namespace names.
    pub async fn activate(&self) -> Vec<String> {
        let allowed = [&self.static_cache, &self.data_cache, &self.font_cache];
        let stale: Vec<String> = self
            .storage
            .keys()
            .await
            .into_iter()
            .filter(|name| !allowed.contains(&name))
            .collect();

        future::join_all(stale.iter().map(|name| self.storage.delete(name))).await;

        for name in &stale {
            info!(cache = %name, "Deleted stale cache namespace");
        }
        stale
    }

    // ===== Interception =====

    pub async fn intercept(&self, request: Request) -> Result<Intercepted, CacheError> {
        let request = Request {
            url: self.resolve(&request.url)?,
            ..request
        };
        let strategy = Strategy::for_request(&request);
        debug!(url = %request.url, ?strategy, "Intercepting request");

        match strategy {
            Strategy::NavigationShell => self.navigation_shell(&request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
            Strategy::CacheFirstStore => self.cache_first_store(&request).await,
            Strategy::CacheFirst => self.cache_first(&request).await,
        }
    }

    async fn navigation_shell(&self, request: &Request) -> Result<Intercepted, CacheError> {
        if let Some(shell) = self.storage.match_any(&self.shell_url).await {
            return Ok(Intercepted::from_cache(shell));
        }
        debug!(url = %request.url, "No cached shell, navigating over network");
        let response = self.fetcher.fetch(request).await?;
        Ok(Intercepted::from_network(response))
    }

    async fn stale_while_revalidate(&self, request: Request) -> Result<Intercepted, CacheError> {
        let cache = self.storage.open(&self.data_cache).await;

        if let Some(cached) = cache.match_url(&request.url).await {
            debug!(url = %request.url, "Serving cached data, revalidating in background");
            let task = tokio::spawn(revalidate(
                Arc::clone(&self.fetcher),
                cache,
                request,
                self.data_max_entries,
            ));
            let mut intercepted = Intercepted::from_cache(cached);
            intercepted.revalidation = Some(task);
            return Ok(intercepted);
        }

        let response = self.fetcher.fetch(&request).await?;
        store_and_trim(&cache, &request.url, &response, self.data_max_entries).await;
        Ok(Intercepted::from_network(response))
    }

    async fn cache_first_store(&self, request: &Request) -> Result<Intercepted, CacheError> {
        let cache = self.storage.open(&self.font_cache).await;

        if let Some(cached) = cache.match_url(&request.url).await {
            return Ok(Intercepted::from_cache(cached));
        }

        let response = self.fetcher.fetch(request).await?;
        store_and_trim(&cache, &request.url, &response, self.font_max_entries).await;
        Ok(Intercepted::from_network(response))
    }

    async fn cache_first(&self, request: &Request) -> Result<Intercepted, CacheError> {
        if let Some(cached) = self.storage.match_any(&request.url).await {
            return Ok(Intercepted::from_cache(cached));
        }
        let response = self.fetcher.fetch(request).await?;
        Ok(Intercepted::from_network(response))
    }

    // ===== Eviction =====

    /// Trim the named namespace down to `max_items` entries.
    pub async fn trim(&self, name: &str, max_items: usize) -> usize {
        let cache = self.storage.open(name).await;
        trim_cache(&cache, max_items).await
    }
}

fn resolve(origin: &Url, url: &str) -> Result<String, CacheError> {
    origin
        .join(url)
        .map(String::from)
        .map_err(|e| CacheError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

/// Refresh a cached data entry. Failures are logged and dropped: the
/// caller already has its answer.
async fn revalidate<F: Fetcher>(fetcher: Arc<F>, cache: Cache, request: Request, max_items: usize) {
    match fetcher.fetch(&request).await {
        Ok(response) => {
            if !store_and_trim(&cache, &request.url, &response, max_items).await {
                debug!(url = %request.url, status = response.status, "Revalidation response not cached");
            }
        }
        Err(e) => {
            warn!(url = %request.url, error = %e, "Background revalidation failed");
        }
    }
}

/// Store a copy of a 200 response and trim. Returns whether it was stored.
async fn store_and_trim(cache: &Cache, key: &str, response: &Response, max_items: usize) -> bool {
    if !response.is_cacheable() {
        return false;
    }
    cache.put(key, response.clone()).await;
    trim_cache(cache, max_items).await;
    true
}

/// Delete the oldest entries until at most `max_items` remain.
///
/// Deletions run concurrently. A store racing with the trim can leave the
/// namespace one entry over until the next trim.
pub async fn trim_cache(cache: &Cache, max_items: usize) -> usize {
    let keys = cache.keys().await;
    if keys.len() <= max_items {
        return 0;
    }

    let excess = keys.len() - max_items;
    let deleted = future::join_all(keys[..excess].iter().map(|key| cache.delete(key)))
        .await
        .into_iter()
        .filter(|&removed| removed)
        .count();

    debug!(cache = cache.name(), deleted, max_items, "Trimmed cache");
    deleted
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::FetchError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const ORIGIN: &str = "https://quiz.example/app/";

    /// In-memory network: serves whatever was registered, fails otherwise.
    #[derive(Default)]
    struct FakeNetwork {
        routes: Mutex<HashMap<String, (u16, Vec<u8>)>>,
        calls: AtomicUsize,
    }

    impl FakeNetwork {
        fn serve(&self, url: &str, status: u16, body: &str) {
            self.routes
                .lock()
                .expect("routes lock")
                .insert(url.to_string(), (status, body.as_bytes().to_vec()));
        }

        fn go_offline(&self) {
            self.routes.lock().expect("routes lock").clear();
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Fetcher for FakeNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let route = self.routes.lock().expect("routes lock").get(&request.url).cloned();
            match route {
                Some((status, body)) => Ok(Response::new(request.url.clone(), status, body)),
                None => Err(FetchError::Unavailable(request.url.clone())),
            }
        }
    }

    fn config() -> Config {
        Config {
            origin: ORIGIN.to_string(),
            assets: vec!["./".to_string(), "./index.html".to_string(), "./app.js".to_string()],
            ..Config::default()
        }
    }

    fn manager() -> (CacheManager<FakeNetwork>, Arc<FakeNetwork>) {
        let network = Arc::new(FakeNetwork::default());
        let manager = CacheManager::new(&config(), Arc::new(CacheStorage::new()), Arc::clone(&network))
            .expect("valid config");
        (manager, network)
    }

    fn url(path: &str) -> String {
        format!("{ORIGIN}{path}")
    }

    fn serve_assets(network: &FakeNetwork) {
        network.serve(ORIGIN, 200, "root");
        network.serve(&url("index.html"), 200, "<html>shell</html>");
        network.serve(&url("app.js"), 200, "app");
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(
            Strategy::for_request(&Request::navigate("https://quiz.example/?topic=x")),
            Strategy::NavigationShell
        );
        assert_eq!(
            Strategy::for_request(&Request::get("https://quiz.example/data/pmp.json")),
            Strategy::StaleWhileRevalidate
        );
        assert_eq!(
            Strategy::for_request(
                &Request::get("https://fonts.gstatic.com/inter.woff2").with_destination(Destination::Font)
            ),
            Strategy::CacheFirstStore
        );
        assert_eq!(
            Strategy::for_request(&Request::get("https://quiz.example/style.css")),
            Strategy::CacheFirst
        );
        // Query strings hide the extension
        assert_eq!(
            Strategy::for_request(&Request::get("https://quiz.example/pmp.json?v=2")),
            Strategy::CacheFirst
        );
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let config = Config {
            origin: "not a url".to_string(),
            ..Config::default()
        };
        let result = CacheManager::new(
            &config,
            Arc::new(CacheStorage::new()),
            Arc::new(FakeNetwork::default()),
        );
        assert!(matches!(result, Err(CacheError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_install_precaches_manifest() {
        let (manager, network) = manager();
        serve_assets(&network);

        let count = manager.install().await.expect("install succeeds");
        assert_eq!(count, 3);

        let cache = manager.storage().open("selfquiz-cache-v1.3.24").await;
        assert_eq!(cache.keys().await, vec![url(""), url("index.html"), url("app.js")]);
    }

    #[tokio::test]
    async fn test_install_is_atomic() {
        let (manager, network) = manager();
        serve_assets(&network);
        network.serve(&url("app.js"), 404, "missing");

        let err = manager.install().await.expect_err("404 fails the install");
        assert!(matches!(err, CacheError::InstallFailed { ref url, .. } if url.ends_with("app.js")));
        assert!(!manager.storage().has("selfquiz-cache-v1.3.24").await);

        network.go_offline();
        assert!(manager.install().await.is_err());
        assert!(manager.storage().keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_activate_deletes_stale_namespaces() {
        let (manager, _network) = manager();
        let storage = manager.storage();
        for name in [
            "selfquiz-cache-v1.3.23",
            "selfquiz-cache-v1.3.24",
            "selfquiz-data-v1",
            "selfquiz-fonts-v1",
            "other-app",
        ] {
            storage.open(name).await;
        }

        let deleted = manager.activate().await;
        assert_eq!(deleted, vec!["selfquiz-cache-v1.3.23", "other-app"]);
        assert_eq!(
            storage.keys().await,
            vec!["selfquiz-cache-v1.3.24", "selfquiz-data-v1", "selfquiz-fonts-v1"]
        );
    }

    #[tokio::test]
    async fn test_data_cache_keeps_ten_newest() {
        let (manager, network) = manager();
        for i in 0..12 {
            let path = format!("quizzes/{i}.json");
            network.serve(&url(&path), 200, "{}");
            let intercepted = manager.intercept(Request::get(path)).await.expect("fetch quiz");
            assert_eq!(intercepted.source, ResponseSource::Network);
        }

        let cache = manager.storage().open("selfquiz-data-v1").await;
        let keys = cache.keys().await;
        assert_eq!(keys.len(), 10);
        assert!(!keys.contains(&url("quizzes/0.json")));
        assert!(!keys.contains(&url("quizzes/1.json")));
        assert_eq!(keys.first(), Some(&url("quizzes/2.json")));
        assert_eq!(keys.last(), Some(&url("quizzes/11.json")));
    }

    #[tokio::test]
    async fn test_trim_below_limit_is_noop() {
        let (manager, _network) = manager();
        let cache = manager.storage().open("scratch").await;
        for i in 0..3 {
            cache.put(&format!("k{i}"), Response::new("k", 200, "")).await;
        }
        assert_eq!(manager.trim("scratch", 3).await, 0);
        assert_eq!(manager.trim("scratch", 1).await, 2);
        assert_eq!(cache.keys().await, vec!["k2"]);
    }

    #[tokio::test]
    async fn test_stale_while_revalidate() {
        let (manager, network) = manager();
        let quiz = url("data/pmp.json");
        manager
            .storage()
            .open("selfquiz-data-v1")
            .await
            .put(&quiz, Response::new(quiz.clone(), 200, "old"))
            .await;
        network.serve(&quiz, 200, "new");

        let first = manager.intercept(Request::get(quiz.clone())).await.expect("cached hit");
        assert_eq!(first.source, ResponseSource::Cache);
        assert!(first.revalidation.is_some());
        let first = first.settled().await;
        assert_eq!(first.text(), "old");

        let second = manager.intercept(Request::get(quiz.clone())).await.expect("cached hit");
        assert_eq!(second.response.text(), "new");
        second.settled().await;
    }

    #[tokio::test]
    async fn test_failed_revalidation_keeps_cached_copy() {
        let (manager, network) = manager();
        let quiz = url("data/offline.json");
        let cache = manager.storage().open("selfquiz-data-v1").await;
        cache.put(&quiz, Response::new(quiz.clone(), 200, "cached")).await;

        let response = manager
            .intercept(Request::get(quiz.clone()))
            .await
            .expect("offline hit still answers")
            .settled()
            .await;
        assert_eq!(response.text(), "cached");
        assert_eq!(network.calls(), 1);
        assert_eq!(cache.match_url(&quiz).await.map(|r| r.body), Some(b"cached".to_vec()));
    }

    #[tokio::test]
    async fn test_data_miss_non_200_passes_through_uncached() {
        let (manager, network) = manager();
        let quiz = url("data/missing.json");
        network.serve(&quiz, 404, "not found");

        let intercepted = manager.intercept(Request::get(quiz.clone())).await.expect("404 answers");
        assert_eq!(intercepted.response.status, 404);
        assert!(manager
            .storage()
            .open("selfquiz-data-v1")
            .await
            .match_url(&quiz)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_data_miss_offline_is_an_error() {
        let (manager, _network) = manager();
        let err = manager
            .intercept(Request::get("data/never-seen.json"))
            .await
            .expect_err("no cache and no network");
        assert!(matches!(err, CacheError::Fetch(FetchError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_fonts_cache_first_and_bounded() {
        let (manager, network) = manager();
        let font = |i: usize| format!("https://fonts.gstatic.com/s/inter/{i}.woff2");
        for i in 0..7 {
            network.serve(&font(i), 200, "font");
            manager
                .intercept(Request::get(font(i)).with_destination(Destination::Font))
                .await
                .expect("font fetch");
        }

        let cache = manager.storage().open("selfquiz-fonts-v1").await;
        assert_eq!(cache.len().await, 5);
        assert!(cache.match_url(&font(0)).await.is_none());

        let calls = network.calls();
        network.go_offline();
        let cached = manager
            .intercept(Request::get(font(6)).with_destination(Destination::Font))
            .await
            .expect("served from cache");
        assert_eq!(cached.source, ResponseSource::Cache);
        assert_eq!(network.calls(), calls);
    }

    #[tokio::test]
    async fn test_navigation_serves_shell_with_query() {
        let (manager, network) = manager();
        serve_assets(&network);
        manager.install().await.expect("install");
        network.go_offline();

        let intercepted = manager
            .intercept(Request::navigate(format!("{ORIGIN}?topic=agile&mode=exam")))
            .await
            .expect("shell served offline");
        assert_eq!(intercepted.source, ResponseSource::Cache);
        assert_eq!(intercepted.response.text(), "<html>shell</html>");
    }

    #[tokio::test]
    async fn test_navigation_without_shell_uses_network() {
        let (manager, network) = manager();
        network.serve(&url("about"), 200, "about page");

        let intercepted = manager
            .intercept(Request::navigate(url("about")))
            .await
            .expect("network navigation");
        assert_eq!(intercepted.source, ResponseSource::Network);
        assert_eq!(intercepted.response.text(), "about page");
    }

    #[tokio::test]
    async fn test_default_cache_first_does_not_store() {
        let (manager, network) = manager();
        serve_assets(&network);
        manager.install().await.expect("install");

        let hit = manager.intercept(Request::get("./app.js")).await.expect("precached");
        assert_eq!(hit.source, ResponseSource::Cache);

        network.serve(&url("extra.css"), 200, "body{}");
        let miss = manager.intercept(Request::get("./extra.css")).await.expect("network");
        assert_eq!(miss.source, ResponseSource::Network);
        assert!(manager.storage().match_any(&url("extra.css")).await.is_none());
    }
}
