//! Image loading with an ordered fallback chain.
//!
//! A request is a list of candidate sources. They are tried one after the
//! other on a background thread; the first one that decodes wins and the rest
//! are never touched. Each request carries a [`RequestToken`] and only the
//! result for the most recent token is ever applied, so a slow, superseded
//! load cannot overwrite a newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use image::RgbaImage;

use crate::error::LoadError;

/// Identifies one call to [`ImageLoader::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

/// Produces the raw bytes behind a source string.
pub trait SourceFetcher: Send + Sync {
    fn fetch(&self, source: &str) -> Result<Vec<u8>, LoadError>;
}

/// Reads local paths and `file://` URLs from disk, `http(s)://` URLs over the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFetcher;

impl SourceFetcher for DefaultFetcher {
    fn fetch(&self, source: &str) -> Result<Vec<u8>, LoadError> {
        if source.starts_with("http://") || source.starts_with("https://") {
            let response =
                ehttp::fetch_blocking(&ehttp::Request::get(source)).map_err(LoadError::Fetch)?;
            if !response.ok {
                return Err(LoadError::Http {
                    status: response.status,
                    status_text: response.status_text,
                });
            }
            return Ok(response.bytes);
        }
        let path = source.strip_prefix("file://").unwrap_or(source);
        Ok(std::fs::read(path)?)
    }
}

/// A decoded image and the source it came from.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub source: String,
    pub pixels: RgbaImage,
}

impl LoadedImage {
    /// Natural size in pixels, `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

/// Visible state of the loader.
#[derive(Debug, Clone, Default)]
pub enum LoadState {
    /// Nothing requested yet
    #[default]
    Idle,
    Loading,
    Ready(Arc<LoadedImage>),
    /// Every candidate failed
    Unavailable,
}

impl LoadState {
    pub fn image(&self) -> Option<&Arc<LoadedImage>> {
        match self {
            LoadState::Ready(image) => Some(image),
            _ => None,
        }
    }
}

/// Try each source in order and return the first one that decodes.
pub fn load_chain(
    fetcher: &dyn SourceFetcher,
    sources: &[String],
) -> Result<LoadedImage, LoadError> {
    let mut last_error = LoadError::EmptyCandidates;
    for source in sources {
        match fetch_and_decode(fetcher, source) {
            Ok(pixels) => {
                log::info!(
                    "🖼️ Loaded {} ({}x{})",
                    source,
                    pixels.width(),
                    pixels.height()
                );
                return Ok(LoadedImage {
                    source: source.clone(),
                    pixels,
                });
            }
            Err(e) => {
                log::debug!("Image candidate {} failed: {}", source, e);
                last_error = e;
            }
        }
    }
    Err(last_error)
}

fn fetch_and_decode(fetcher: &dyn SourceFetcher, source: &str) -> Result<RgbaImage, LoadError> {
    let bytes = fetcher.fetch(source)?;
    let image = image::load_from_memory(&bytes)?;
    Ok(image.to_rgba8())
}

struct LoadRequest {
    token: RequestToken,
    sources: Vec<String>,
}

struct LoadOutcome {
    token: RequestToken,
    result: Result<LoadedImage, LoadError>,
}

/// Called on the loader thread after each finished request, e.g. to wake the UI.
pub type WakeFn = Box<dyn Fn() + Send>;

/// Runs fallback chains on a background thread and applies their results.
pub struct ImageLoader {
    request_tx: Option<Sender<LoadRequest>>,
    result_rx: Receiver<LoadOutcome>,
    thread_handle: Option<JoinHandle<()>>,
    /// Token of the newest request, shared so the thread can skip stale work
    latest: Arc<AtomicU64>,
    next_token: u64,
    sources: Vec<String>,
    state: LoadState,
}

impl ImageLoader {
    pub fn new(fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self::with_wake(fetcher, None)
    }

    /// Create a loader that calls `wake` whenever a request finishes.
    pub fn with_wake(fetcher: Arc<dyn SourceFetcher>, wake: Option<WakeFn>) -> Self {
        let (request_tx, request_rx) = mpsc::channel::<LoadRequest>();
        let (result_tx, result_rx) = mpsc::channel::<LoadOutcome>();
        let latest = Arc::new(AtomicU64::new(0));

        let thread_latest = Arc::clone(&latest);
        let thread_handle = thread::Builder::new()
            .name("image-loader".to_string())
            .spawn(move || {
                Self::thread_loop(fetcher.as_ref(), request_rx, result_tx, &thread_latest, wake);
                log::debug!("Image loader thread exiting");
            });

        let (request_tx, thread_handle) = match thread_handle {
            Ok(handle) => (Some(request_tx), Some(handle)),
            Err(e) => {
                log::error!("Failed to spawn image loader thread: {}", e);
                (None, None)
            }
        };

        Self {
            request_tx,
            result_rx,
            thread_handle,
            latest,
            next_token: 0,
            sources: Vec::new(),
            state: LoadState::Idle,
        }
    }

    fn thread_loop(
        fetcher: &dyn SourceFetcher,
        request_rx: Receiver<LoadRequest>,
        result_tx: Sender<LoadOutcome>,
        latest: &AtomicU64,
        wake: Option<WakeFn>,
    ) {
        while let Ok(request) = request_rx.recv() {
            if request.token.0 != latest.load(Ordering::Acquire) {
                log::debug!("Skipping superseded load {:?}", request.token);
                continue;
            }
            let result = load_chain(fetcher, &request.sources);
            if result_tx
                .send(LoadOutcome {
                    token: request.token,
                    result,
                })
                .is_err()
            {
                break;
            }
            if let Some(wake) = &wake {
                wake();
            }
        }
    }

    /// Start loading `sources`, superseding any request still in flight.
    pub fn load(&mut self, sources: Vec<String>) -> RequestToken {
        self.next_token += 1;
        let token = RequestToken(self.next_token);
        self.latest.store(token.0, Ordering::Release);
        self.sources = sources.clone();

        if sources.is_empty() {
            self.state = LoadState::Unavailable;
            return token;
        }

        self.state = LoadState::Loading;
        let sent = self
            .request_tx
            .as_ref()
            .is_some_and(|tx| tx.send(LoadRequest { token, sources }).is_ok());
        if !sent {
            log::error!("Image loader thread is gone; cannot load");
            self.state = LoadState::Unavailable;
        }
        token
    }

    /// Apply finished results. Returns true if the state changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(outcome) = self.result_rx.try_recv() {
            if Some(outcome.token) != self.current_token() {
                log::debug!("Discarding stale image result {:?}", outcome.token);
                continue;
            }
            self.state = match outcome.result {
                Ok(image) => LoadState::Ready(Arc::new(image)),
                Err(e) => {
                    log::warn!("No image available for {:?}: {}", self.sources, e);
                    LoadState::Unavailable
                }
            };
            changed = true;
        }
        changed
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    /// Sources of the most recent request.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn current_token(&self) -> Option<RequestToken> {
        (self.next_token > 0).then_some(RequestToken(self.next_token))
    }
}

impl Drop for ImageLoader {
    fn drop(&mut self) {
        // Closing the request channel ends the thread loop.
        self.request_tx.take();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// In-memory sources; unknown names fail to fetch. Records every attempt.
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pub files: HashMap<String, Vec<u8>>,
        pub delays: HashMap<String, Duration>,
        pub attempts: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub(crate) fn with(mut self, name: &str, bytes: Vec<u8>) -> Self {
            self.files.insert(name.to_string(), bytes);
            self
        }

        pub(crate) fn delayed(mut self, name: &str, delay: Duration) -> Self {
            self.delays.insert(name.to_string(), delay);
            self
        }

        pub(crate) fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    impl SourceFetcher for FakeFetcher {
        fn fetch(&self, source: &str) -> Result<Vec<u8>, LoadError> {
            self.attempts.lock().unwrap().push(source.to_string());
            if let Some(delay) = self.delays.get(source) {
                thread::sleep(*delay);
            }
            self.files.get(source).cloned().ok_or_else(|| {
                LoadError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    source.to_string(),
                ))
            })
        }
    }

    pub(crate) fn wait_until_settled(loader: &mut ImageLoader) {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            loader.poll();
            if !matches!(loader.state(), LoadState::Loading) || Instant::now() > deadline {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_chain_falls_through_to_first_good() {
        let fetcher = FakeFetcher::default()
            .with("bad2.png", b"not an image".to_vec())
            .with("good.png", png_bytes(4, 3))
            .with("later.png", png_bytes(8, 8));

        let image =
            load_chain(&fetcher, &names(&["bad1.png", "bad2.png", "good.png", "later.png"]))
                .unwrap();

        assert_eq!(image.source, "good.png");
        assert_eq!(image.size(), (4, 3));
        assert_eq!(fetcher.attempts(), names(&["bad1.png", "bad2.png", "good.png"]));
    }

    #[test]
    fn test_chain_exhausted() {
        let fetcher = FakeFetcher::default().with("corrupt.png", vec![0, 1, 2, 3]);
        let result = load_chain(&fetcher, &names(&["missing.png", "corrupt.png"]));
        assert!(matches!(result, Err(LoadError::Decode(_))));

        assert!(matches!(
            load_chain(&fetcher, &[]),
            Err(LoadError::EmptyCandidates)
        ));
    }

    #[test]
    fn test_loader_resolves_in_background() {
        let fetcher = Arc::new(FakeFetcher::default().with("good.png", png_bytes(5, 7)));
        let mut loader = ImageLoader::new(fetcher.clone());

        loader.load(names(&["bad1.png", "bad2.png", "good.png"]));
        assert!(matches!(loader.state(), LoadState::Loading));
        wait_until_settled(&mut loader);

        let image = loader.state().image().expect("image should be ready");
        assert_eq!(image.source, "good.png");
        assert_eq!(image.size(), (5, 7));
        assert_eq!(fetcher.attempts(), names(&["bad1.png", "bad2.png", "good.png"]));
    }

    #[test]
    fn test_loader_reports_unavailable() {
        let mut loader = ImageLoader::new(Arc::new(FakeFetcher::default()));
        loader.load(names(&["nope.png"]));
        wait_until_settled(&mut loader);
        assert!(matches!(loader.state(), LoadState::Unavailable));

        loader.load(Vec::new());
        assert!(matches!(loader.state(), LoadState::Unavailable));
    }

    #[test]
    fn test_newer_request_wins() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .with("slow.png", png_bytes(2, 2))
                .with("fast.png", png_bytes(3, 3))
                .delayed("slow.png", Duration::from_millis(100)),
        );
        let mut loader = ImageLoader::new(fetcher);

        let first = loader.load(names(&["slow.png"]));
        let second = loader.load(names(&["fast.png"]));
        assert!(second > first);
        assert_eq!(loader.current_token(), Some(second));

        wait_until_settled(&mut loader);
        thread::sleep(Duration::from_millis(200));
        loader.poll();

        let image = loader.state().image().expect("image should be ready");
        assert_eq!(image.source, "fast.png");
    }

    #[test]
    fn test_wake_called_after_each_request() {
        let woken = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&woken);
        let fetcher = Arc::new(FakeFetcher::default().with("a.png", png_bytes(1, 1)));
        let mut loader = ImageLoader::with_wake(
            fetcher,
            Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );

        loader.load(names(&["a.png"]));
        wait_until_settled(&mut loader);
        assert!(loader.state().image().is_some());

        // Dropping joins the thread, so the wake call has happened by now.
        drop(loader);
        assert_eq!(woken.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_file_url_prefix_is_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        std::fs::write(&path, png_bytes(6, 2)).unwrap();

        let url = format!("file://{}", path.display());
        let image = load_chain(&DefaultFetcher, &[url.clone()]).unwrap();
        assert_eq!(image.source, url);
        assert_eq!(image.size(), (6, 2));

        let plain = path.display().to_string();
        assert!(load_chain(&DefaultFetcher, &[plain]).is_ok());
    }
}
