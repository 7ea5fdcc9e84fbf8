// fetch_engine.rs
use crate::engine::{DownloadId, DownloadRequest, Engine, EngineEvent, History};
use crate::page::Page;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;

pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Gecko/20100101 Chrome/119.0.0.0";

const CHUNK_SIZE: usize = 16 * 1024;

type Waker = Arc<dyn Fn() + Send + Sync>;

enum NavUpdate {
    Event(EngineEvent),
    Page(Page),
    BecameDownload(DownloadRequest, mpsc::Sender<Option<PathBuf>>),
}

enum WorkerMessage {
    Navigation { generation: u64, update: NavUpdate },
    Download(EngineEvent),
}

/// Worker-side handle for reporting back to the UI thread.
#[derive(Clone)]
struct Reporter {
    generation: u64,
    sender: mpsc::Sender<WorkerMessage>,
    waker: Option<Waker>,
}

impl Reporter {
    fn send(&self, message: WorkerMessage) {
        if self.sender.send(message).is_err() {
            debug!("Engine dropped before worker finished");
            return;
        }
        if let Some(wake) = &self.waker {
            wake();
        }
    }

    fn nav(&self, update: NavUpdate) {
        self.send(WorkerMessage::Navigation {
            generation: self.generation,
            update,
        });
    }

    fn event(&self, event: EngineEvent) {
        self.nav(NavUpdate::Event(event));
    }
}

/// Fetches documents over HTTP(S), one worker thread per navigation.
pub struct FetchEngine {
    client: Client,
    history: History,
    page: Option<Page>,
    generation: u64,
    download_ids: Arc<AtomicU64>,
    pending_downloads: HashMap<DownloadId, mpsc::Sender<Option<PathBuf>>>,
    sender: mpsc::Sender<WorkerMessage>,
    receiver: mpsc::Receiver<WorkerMessage>,
    waker: Option<Waker>,
}

impl FetchEngine {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        let (sender, receiver) = mpsc::channel();
        Ok(FetchEngine {
            client,
            history: History::default(),
            page: None,
            generation: 0,
            download_ids: Arc::new(AtomicU64::new(1)),
            pending_downloads: HashMap::new(),
            sender,
            receiver,
            waker: None,
        })
    }

    /// Called from worker threads whenever an event is queued.
    pub fn with_waker(mut self, waker: impl Fn() + Send + Sync + 'static) -> Self {
        self.waker = Some(Arc::new(waker));
        self
    }

    fn start(&mut self, url: String) {
        self.generation += 1;
        let reporter = Reporter {
            generation: self.generation,
            sender: self.sender.clone(),
            waker: self.waker.clone(),
        };
        let client = self.client.clone();
        let download_ids = Arc::clone(&self.download_ids);

        info!("Loading {}", url);
        thread::spawn(move || run_navigation(&client, &url, &reporter, &download_ids));
    }

    fn apply(&mut self, update: NavUpdate, events: &mut Vec<EngineEvent>) {
        match update {
            NavUpdate::Page(page) => {
                self.history.commit();
                self.page = Some(page);
            }
            NavUpdate::Event(EngineEvent::UrlChanged(url)) => {
                self.history.replace_current(&url);
                events.push(EngineEvent::UrlChanged(url));
            }
            NavUpdate::Event(event) => events.push(event),
            NavUpdate::BecameDownload(request, decision) => {
                // The page on screen stays; only the history entry goes.
                self.history.pop_current();
                self.pending_downloads.insert(request.id, decision);
                let title = match &self.page {
                    Some(page) => page.display_title().to_string(),
                    None => request.suggested_filename.clone(),
                };
                let previous_url = self.page.as_ref().map(|page| page.url.clone());
                events.push(EngineEvent::DownloadRequested(request));
                if let Some(url) = previous_url {
                    events.push(EngineEvent::UrlChanged(url));
                }
                events.push(EngineEvent::LoadProgress(100));
                events.push(EngineEvent::LoadFinished { ok: true, title });
            }
        }
    }
}

impl Engine for FetchEngine {
    fn load(&mut self, url: &str) {
        self.history.push(url);
        self.start(url.to_string());
    }

    fn back(&mut self) {
        if let Some(url) = self.history.back().map(str::to_string) {
            self.start(url);
        }
    }

    fn forward(&mut self) {
        if let Some(url) = self.history.forward().map(str::to_string) {
            self.start(url);
        }
    }

    fn reload(&mut self) {
        if let Some(url) = self.history.current().map(str::to_string) {
            self.start(url);
        }
    }

    fn poll_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                WorkerMessage::Navigation { generation, update } => {
                    if generation != self.generation {
                        debug!("Dropping update from superseded navigation {}", generation);
                        continue;
                    }
                    self.apply(update, &mut events);
                }
                WorkerMessage::Download(event) => events.push(event),
            }
        }
        events
    }

    fn resolve_download(&mut self, id: DownloadId, path: Option<PathBuf>) {
        match self.pending_downloads.remove(&id) {
            Some(decision) => {
                if decision.send(path).is_err() {
                    warn!("Download {} worker is gone", id);
                }
            }
            None => warn!("No pending download with id {}", id),
        }
    }

    fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }
}

fn run_navigation(client: &Client, url: &str, reporter: &Reporter, download_ids: &AtomicU64) {
    reporter.event(EngineEvent::LoadStarted);
    reporter.event(EngineEvent::LoadProgress(0));

    if let Err(e) = fetch(client, url, reporter, download_ids) {
        warn!("Failed to load {}: {:#}", url, e);
        reporter.event(EngineEvent::UrlChanged(url.to_string()));
        reporter.nav(NavUpdate::Page(Page::error(url, &format!("{:#}", e))));
        reporter.event(EngineEvent::LoadProgress(100));
        reporter.event(EngineEvent::LoadFinished {
            ok: false,
            title: "Error".to_string(),
        });
    }
}

fn fetch(client: &Client, url: &str, reporter: &Reporter, download_ids: &AtomicU64) -> Result<()> {
    let mut response = client.get(url).send()?;
    let final_url = response.url().to_string();
    reporter.event(EngineEvent::UrlChanged(final_url.clone()));

    let content_type = header_str(&response, CONTENT_TYPE.as_str());
    let disposition = header_str(&response, CONTENT_DISPOSITION.as_str());

    if is_download(content_type.as_deref(), disposition.as_deref()) {
        let request = DownloadRequest {
            id: download_ids.fetch_add(1, Ordering::Relaxed),
            suggested_filename: suggested_filename(disposition.as_deref(), &final_url),
            url: final_url,
        };
        let (decision_tx, decision_rx) = mpsc::channel();
        reporter.nav(NavUpdate::BecameDownload(request.clone(), decision_tx));

        match decision_rx.recv() {
            Ok(Some(path)) => {
                let event = match save_download(&mut response, &path) {
                    Ok(()) => {
                        info!("Saved {} to {}", request.url, path.display());
                        EngineEvent::DownloadFinished { id: request.id, path }
                    }
                    Err(e) => EngineEvent::DownloadFailed {
                        id: request.id,
                        error: format!("{:#}", e),
                    },
                };
                reporter.send(WorkerMessage::Download(event));
            }
            _ => info!("Download of {} dropped", request.url),
        }
        return Ok(());
    }

    let body = read_with_progress(&mut response, reporter)?;
    let body = String::from_utf8_lossy(&body);
    let page = if content_type.as_deref().is_some_and(|ct| ct.contains("html")) {
        Page::from_html(&final_url, &body)
    } else {
        Page::from_plain_text(&final_url, &body)
    };
    let title = page.display_title().to_string();

    reporter.nav(NavUpdate::Page(page));
    reporter.event(EngineEvent::LoadProgress(100));
    reporter.event(EngineEvent::LoadFinished { ok: true, title });
    Ok(())
}

fn header_str(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn read_with_progress(response: &mut Response, reporter: &Reporter) -> Result<Vec<u8>> {
    let total = response.content_length();
    let mut body = Vec::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut last_percent = 0;

    loop {
        let n = response.read(&mut buf)?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
        let percent = progress_percent(body.len() as u64, total);
        if percent != last_percent {
            last_percent = percent;
            reporter.event(EngineEvent::LoadProgress(percent));
        }
    }
    Ok(body)
}

fn save_download(response: &mut Response, path: &Path) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    io::copy(response, &mut file).context("download interrupted")?;
    Ok(())
}

/// Without a content length the bar parks at 50 until the body ends.
fn progress_percent(read: u64, total: Option<u64>) -> u8 {
    match total {
        Some(0) | None => 50,
        Some(total) => (read.saturating_mul(99) / total).min(99) as u8,
    }
}

fn is_download(content_type: Option<&str>, disposition: Option<&str>) -> bool {
    if disposition.is_some_and(|d| d.trim_start().to_lowercase().starts_with("attachment")) {
        return true;
    }
    match content_type {
        None => false,
        Some(ct) => {
            let ct = ct.to_lowercase();
            !(ct.starts_with("text/")
                || ct.contains("html")
                || ct.contains("xml")
                || ct.contains("json"))
        }
    }
}

fn suggested_filename(disposition: Option<&str>, url: &str) -> String {
    let from_header = disposition.and_then(|d| {
        d.split(';').find_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            if key.trim().eq_ignore_ascii_case("filename") {
                let name = value.trim().trim_matches('"');
                (!name.is_empty()).then(|| name.to_string())
            } else {
                None
            }
        })
    });
    from_header
        .or_else(|| {
            let path = url.split(['?', '#']).next().unwrap_or(url);
            let name = path.rsplit('/').next().unwrap_or("");
            let is_host = path.matches('/').count() <= 2;
            (!name.is_empty() && !is_host).then(|| name.to_string())
        })
        .unwrap_or_else(|| "download".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    const HOME_HTML: &str =
        "<html><head><title>Home</title></head><body><p>Welcome back</p></body></html>";

    /// Serves `(path, content type, body)` routes on a local port until the test exits.
    fn serve(routes: Vec<(&'static str, &'static str, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}/", listener.local_addr().unwrap());
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                loop {
                    let mut header = String::new();
                    match reader.read_line(&mut header) {
                        Ok(0) | Err(_) => break,
                        Ok(_) if header == "\r\n" => break,
                        Ok(_) => {}
                    }
                }
                let path = request_line.split_whitespace().nth(1).unwrap_or("/");
                let (content_type, body) = routes
                    .iter()
                    .find(|(route, ..)| *route == path)
                    .map(|(_, ct, body)| (*ct, *body))
                    .unwrap_or(("text/plain", "missing"));
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    content_type,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        base
    }

    fn local_engine() -> FetchEngine {
        let mut engine = FetchEngine::new().unwrap();
        engine.client = Client::builder()
            .user_agent(USER_AGENT)
            .no_proxy()
            .build()
            .unwrap();
        engine
    }

    fn drain_until(engine: &mut FetchEngine, done: impl Fn(&EngineEvent) -> bool) -> Vec<EngineEvent> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut events = Vec::new();
        while Instant::now() < deadline {
            events.extend(engine.poll_events());
            if events.iter().any(&done) {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        events
    }

    fn drain_until_finished(engine: &mut FetchEngine) -> Vec<EngineEvent> {
        drain_until(engine, |e| matches!(e, EngineEvent::LoadFinished { .. }))
    }

    fn position(events: &[EngineEvent], wanted: &EngineEvent) -> usize {
        events
            .iter()
            .position(|e| e == wanted)
            .unwrap_or_else(|| panic!("{:?} not in {:?}", wanted, events))
    }

    fn download_request(events: &[EngineEvent]) -> (usize, DownloadRequest) {
        events
            .iter()
            .enumerate()
            .find_map(|(i, e)| match e {
                EngineEvent::DownloadRequested(request) => Some((i, request.clone())),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no download request in {:?}", events))
    }

    #[test]
    fn html_response_becomes_page() {
        let base = serve(vec![("/", "text/html; charset=utf-8", HOME_HTML)]);
        let mut engine = local_engine();
        engine.load(&base);

        let events = drain_until_finished(&mut engine);
        let page = engine.page().unwrap();
        assert_eq!(page.title, "Home");
        assert_eq!(page.text, "Welcome back");
        assert_eq!(page.url, base);

        assert_eq!(events.first(), Some(&EngineEvent::LoadStarted));
        assert!(events.contains(&EngineEvent::UrlChanged(base.clone())));
        let done = position(&events, &EngineEvent::LoadProgress(100));
        let finished = position(
            &events,
            &EngineEvent::LoadFinished {
                ok: true,
                title: "Home".into(),
            },
        );
        assert!(done < finished);
    }

    #[test]
    fn download_keeps_previous_page_and_saves_body() {
        let base = serve(vec![
            ("/", "text/html", HOME_HTML),
            ("/f.zip", "application/zip", "ZIPDATA"),
        ]);
        let mut engine = local_engine();
        engine.load(&base);
        drain_until_finished(&mut engine);

        engine.load(&format!("{}f.zip", base));
        let events = drain_until_finished(&mut engine);
        let (at, request) = download_request(&events);
        assert_eq!(request.suggested_filename, "f.zip");
        assert_eq!(
            events[at + 1..].to_vec(),
            vec![
                EngineEvent::UrlChanged(base.clone()),
                EngineEvent::LoadProgress(100),
                EngineEvent::LoadFinished {
                    ok: true,
                    title: "Home".into()
                },
            ]
        );
        assert_eq!(engine.page().map(|p| p.title.as_str()), Some("Home"));
        assert_eq!(engine.history.current(), Some(base.as_str()));

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.zip");
        engine.resolve_download(request.id, Some(path.clone()));
        let events = drain_until(&mut engine, |e| {
            matches!(
                e,
                EngineEvent::DownloadFinished { .. } | EngineEvent::DownloadFailed { .. }
            )
        });
        assert!(events.contains(&EngineEvent::DownloadFinished {
            id: request.id,
            path: path.clone()
        }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "ZIPDATA");
    }

    #[test]
    fn first_navigation_download_still_finishes_load() {
        let base = serve(vec![("/f.zip", "application/zip", "ZIPDATA")]);
        let mut engine = local_engine();
        engine.load(&format!("{}f.zip", base));

        let events = drain_until_finished(&mut engine);
        let (at, request) = download_request(&events);
        assert_eq!(
            events[at + 1..].to_vec(),
            vec![
                EngineEvent::LoadProgress(100),
                EngineEvent::LoadFinished {
                    ok: true,
                    title: "f.zip".into()
                },
            ]
        );
        assert!(engine.page().is_none());

        engine.resolve_download(request.id, None);
        assert!(engine.pending_downloads.is_empty());
    }

    #[test]
    fn classifies_downloads() {
        assert!(!is_download(None, None));
        assert!(!is_download(Some("text/html; charset=utf-8"), None));
        assert!(!is_download(Some("application/xhtml+xml"), None));
        assert!(!is_download(Some("application/json"), None));
        assert!(is_download(Some("application/zip"), None));
        assert!(is_download(Some("text/plain"), Some("attachment; filename=a.txt")));
        assert!(!is_download(Some("text/plain"), Some("inline")));
    }

    #[test]
    fn suggests_filenames() {
        assert_eq!(
            suggested_filename(Some("attachment; filename=\"report.pdf\""), "https://a.test/x"),
            "report.pdf"
        );
        assert_eq!(
            suggested_filename(None, "https://a.test/files/archive.zip?token=1"),
            "archive.zip"
        );
        assert_eq!(suggested_filename(None, "https://a.test/"), "download");
        assert_eq!(suggested_filename(None, "https://a.test"), "download");
    }

    #[test]
    fn progress_is_capped_below_completion() {
        assert_eq!(progress_percent(0, Some(100)), 0);
        assert_eq!(progress_percent(50, Some(100)), 49);
        assert_eq!(progress_percent(100, Some(100)), 99);
        assert_eq!(progress_percent(10, None), 50);
    }

    #[test]
    fn stale_navigation_updates_are_dropped() {
        let mut engine = FetchEngine::new().unwrap();
        engine.generation = 2;
        engine
            .sender
            .send(WorkerMessage::Navigation {
                generation: 1,
                update: NavUpdate::Event(EngineEvent::LoadStarted),
            })
            .unwrap();
        engine
            .sender
            .send(WorkerMessage::Navigation {
                generation: 2,
                update: NavUpdate::Page(Page::from_plain_text("https://a.test/", "hi")),
            })
            .unwrap();

        assert!(engine.poll_events().is_empty());
        assert_eq!(engine.page().map(|p| p.text.as_str()), Some("hi"));
    }

    #[test]
    fn download_requests_wait_for_a_decision() {
        let mut engine = FetchEngine::new().unwrap();
        let (decision_tx, decision_rx) = mpsc::channel();
        let request = DownloadRequest {
            id: 7,
            suggested_filename: "a.zip".into(),
            url: "https://a.test/a.zip".into(),
        };
        engine.history.push("https://a.test/a.zip");
        engine
            .sender
            .send(WorkerMessage::Navigation {
                generation: 0,
                update: NavUpdate::BecameDownload(request.clone(), decision_tx),
            })
            .unwrap();

        let events = engine.poll_events();
        assert_eq!(
            events,
            vec![
                EngineEvent::DownloadRequested(request),
                EngineEvent::LoadProgress(100),
                EngineEvent::LoadFinished {
                    ok: true,
                    title: "a.zip".into()
                },
            ]
        );
        assert_eq!(engine.history.current(), None);

        engine.resolve_download(7, None);
        assert_eq!(decision_rx.recv().unwrap(), None);
        assert!(engine.pending_downloads.is_empty());
    }

    #[test]
    fn unparseable_url_shows_error_page() {
        let mut engine = local_engine();
        engine.load("not a url");

        let events = drain_until_finished(&mut engine);
        assert_eq!(events.first(), Some(&EngineEvent::LoadStarted));
        assert!(events.contains(&EngineEvent::LoadFinished {
            ok: false,
            title: "Error".into()
        }));
        let page = engine.page().unwrap();
        assert!(page.text.starts_with("Failed to load not a url"));
    }
}
