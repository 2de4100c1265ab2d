use super::*;
use crate::feed::video_id_from_url;
use async_trait::async_trait;
use std::sync::Mutex;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Stand-in for yt-dlp: honours the archive, writes `<id>.opus` files and
/// (optionally) manifest lines
#[derive(Default)]
struct FakeTool {
    write_manifest: bool,
    remove_manifest: bool,
    exit_code: i32,
    requests: Mutex<Vec<FetchRequest>>,
}

impl FakeTool {
    fn new() -> Self {
        Self {
            write_manifest: true,
            ..Self::default()
        }
    }

    fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FetchTool for FakeTool {
    async fn fetch(&self, request: &FetchRequest) -> Result<ToolOutcome> {
        self.requests.lock().unwrap().push(request.clone());

        let out_dir = Path::new(&request.output_template).parent().unwrap();
        let archive = DedupArchive::new(&request.archive, "youtube");
        let mut manifest = String::new();
        for url in &request.urls {
            let id = video_id_from_url(url).unwrap();
            if archive.contains(&id)? {
                continue;
            }
            let file = out_dir.join(format!("{id}.opus"));
            std::fs::write(&file, id.as_bytes())?;
            archive.record(&id)?;
            manifest.push_str(&format!("{id}\t{}\n", file.display()));
        }
        if self.write_manifest {
            std::fs::write(&request.manifest, manifest)?;
        }
        if self.remove_manifest {
            std::fs::remove_file(&request.manifest)?;
        }
        Ok(ToolOutcome {
            exit_code: Some(self.exit_code),
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

fn atom(ids: &[(&str, &str)]) -> String {
    let entries: String = ids
        .iter()
        .map(|(id, published)| {
            format!(
                "<entry><id>yt:video:{id}</id><yt:videoId>{id}</yt:videoId>\
                 <link rel=\"alternate\" href=\"https://www.youtube.com/watch?v={id}\"/>\
                 <published>{published}</published></entry>"
            )
        })
        .collect();
    format!(
        "<feed xmlns=\"http://www.w3.org/2005/Atom\" \
         xmlns:yt=\"http://www.youtube.com/xml/schemas/2015\">{entries}</feed>"
    )
}

async fn serve_feed(server: &MockServer, route: &str, status: u16, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.paths.base_dir = dir.path().join("library");
    config.paths.archive_dir = dir.path().join("state").join("archive");
    config.paths.ledger_path = dir.path().join("state").join("ledger.tsv");
    config
}

fn channels(server: &MockServer, entries: &[(&str, &str)]) -> ChannelSet {
    let list: Vec<serde_json::Value> = entries
        .iter()
        .map(|(name, route)| {
            serde_json::json!({"name": name, "url": format!("{}{}", server.uri(), route)})
        })
        .collect();
    ChannelSet::from_json(&serde_json::json!({ "channels": list }).to_string()).unwrap()
}

#[tokio::test]
async fn unreachable_channel_does_not_abort_batch() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve_feed(&server, "/broken", 500, String::new()).await;
    serve_feed(&server, "/garbage", 200, "<feed><entry></feed>".into()).await;
    serve_feed(
        &server,
        "/good",
        200,
        atom(&[("v1", "2024-01-01T00:00:00Z")]),
    )
    .await;

    let config = test_config(&dir);
    let tool = Arc::new(FakeTool::new());
    let orchestrator = FetchOrchestrator::new(&config, tool.clone()).unwrap();
    let summary = orchestrator
        .run(&channels(
            &server,
            &[("Broken", "/broken"), ("Garbage", "/garbage"), ("Good", "/good")],
        ))
        .await
        .unwrap();

    assert_eq!(summary.channels, 3);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.identified, 1);
    assert_eq!(tool.requests().len(), 1);
    assert!(config.paths.audio_root().join("good").join("v1.opus").exists());
}

#[tokio::test]
async fn blocked_channel_directory_does_not_abort_batch() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve_feed(&server, "/alpha", 200, atom(&[("a1", "2024-01-01T00:00:00Z")])).await;
    serve_feed(&server, "/beta", 200, atom(&[("b1", "2024-01-01T00:00:00Z")])).await;

    let config = test_config(&dir);
    // a regular file where Alpha's directory should be
    std::fs::create_dir_all(config.paths.audio_root()).unwrap();
    std::fs::write(config.paths.audio_root().join("alpha"), "not a dir").unwrap();

    let tool = Arc::new(FakeTool::new());
    let summary = FetchOrchestrator::new(&config, tool.clone())
        .unwrap()
        .run(&channels(&server, &[("Alpha", "/alpha"), ("Beta", "/beta")]))
        .await
        .unwrap();

    assert_eq!(summary.channels, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.identified, 1);
    let requests = tool.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].slug, "beta");
    assert!(config.paths.audio_root().join("beta").join("b1.opus").exists());

    let ledger = Ledger::new(&config.paths.ledger_path).read_all().unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].id(), Some("b1"));
}

#[tokio::test]
async fn unreadable_manifest_records_path_only_entries() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve_feed(&server, "/feed", 200, atom(&[("m1", "2024-01-01T00:00:00Z")])).await;

    let config = test_config(&dir);
    let tool = Arc::new(FakeTool {
        write_manifest: true,
        remove_manifest: true,
        ..FakeTool::default()
    });
    let summary = FetchOrchestrator::new(&config, tool)
        .unwrap()
        .run(&channels(&server, &[("Chan", "/feed")]))
        .await
        .unwrap();

    assert_eq!(summary.tool_failures, 0);
    assert_eq!(summary.identified, 0);
    assert_eq!(summary.path_only, 1);
    let ledger = Ledger::new(&config.paths.ledger_path).read_all().unwrap();
    assert!(matches!(ledger[0], LedgerEntry::PathOnly { .. }));
    assert!(ledger[0].path().ends_with("chan/m1.opus"));
}

#[tokio::test]
async fn candidates_are_not_prefiltered_against_archive() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve_feed(
        &server,
        "/feed",
        200,
        atom(&[
            ("old", "2024-01-01T00:00:00Z"),
            ("new", "2024-02-01T00:00:00Z"),
        ]),
    )
    .await;

    let config = test_config(&dir);
    DedupArchive::for_channel(&config.paths.archive_dir, "test-channel", "youtube")
        .record("old")
        .unwrap();

    let tool = Arc::new(FakeTool::new());
    let orchestrator = FetchOrchestrator::new(&config, tool.clone()).unwrap();
    let summary = orchestrator
        .run(&channels(&server, &[("Test Channel", "/feed")]))
        .await
        .unwrap();

    let requests = tool.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].urls,
        vec![
            "https://www.youtube.com/watch?v=new".to_string(),
            "https://www.youtube.com/watch?v=old".to_string(),
        ]
    );
    assert!(requests[0].output_template.ends_with(OUTPUT_TEMPLATE));
    assert!(
        Path::new(&requests[0].output_template)
            .parent()
            .unwrap()
            .ends_with("audio/test-channel")
    );
    assert_eq!(summary.new_files(), 1);

    let ledger = Ledger::new(&config.paths.ledger_path).read_all().unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].id(), Some("new"));
    assert!(ledger[0].path().is_absolute());
}

#[tokio::test]
async fn files_without_manifest_lines_are_path_only() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve_feed(
        &server,
        "/feed",
        200,
        atom(&[("a1", "2024-01-01T00:00:00Z")]),
    )
    .await;

    let config = test_config(&dir);
    let tool = Arc::new(FakeTool {
        write_manifest: false,
        exit_code: 1,
        ..FakeTool::default()
    });
    let orchestrator = FetchOrchestrator::new(&config, tool).unwrap();
    let summary = orchestrator
        .run(&channels(&server, &[("Chan", "/feed")]))
        .await
        .unwrap();

    assert_eq!(summary.tool_failures, 1);
    assert_eq!(summary.path_only, 1);
    let ledger = Ledger::new(&config.paths.ledger_path).read_all().unwrap();
    assert!(matches!(ledger[0], LedgerEntry::PathOnly { .. }));
    assert!(ledger[0].path().ends_with("chan/a1.opus"));
}

#[tokio::test]
async fn max_candidates_keeps_newest() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    serve_feed(
        &server,
        "/feed",
        200,
        atom(&[
            ("a", "2024-01-01T00:00:00Z"),
            ("c", "2024-03-01T00:00:00Z"),
            ("b", "2024-02-01T00:00:00Z"),
        ]),
    )
    .await;

    let mut config = test_config(&dir);
    config.fetch.max_candidates = 2;
    let tool = Arc::new(FakeTool::new());
    let orchestrator = FetchOrchestrator::new(&config, tool.clone()).unwrap();
    orchestrator
        .run(&channels(&server, &[("Chan", "/feed")]))
        .await
        .unwrap();

    let urls = &tool.requests()[0].urls;
    assert_eq!(urls.len(), 2);
    assert!(urls[0].ends_with("v=c"));
    assert!(urls[1].ends_with("v=b"));
}

#[tokio::test]
async fn disabled_channels_are_not_fetched() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let config = test_config(&dir);
    let set = ChannelSet::from_json(&format!(
        r#"{{"channels": [{{"name": "Off", "url": "{}/feed", "enabled": false}}]}}"#,
        server.uri()
    ))
    .unwrap();

    let tool = Arc::new(FakeTool::new());
    let summary = FetchOrchestrator::new(&config, tool.clone())
        .unwrap()
        .run(&set)
        .await
        .unwrap();
    assert_eq!(summary, FetchSummary::default());
    assert!(tool.requests().is_empty());
}

#[test]
fn collect_entries_pairs_manifest_and_diff() {
    let dir = TempDir::new().unwrap();
    let chan = dir.path().join("chan");
    std::fs::create_dir(&chan).unwrap();
    for name in ["old.opus", "m.opus", "orphan.opus", "cover.jpg"] {
        std::fs::write(chan.join(name), "x").unwrap();
    }

    let before: BTreeSet<PathBuf> = [chan.join("old.opus")].into_iter().collect();
    let after: BTreeSet<PathBuf> = ["old.opus", "m.opus", "orphan.opus"]
        .iter()
        .map(|n| chan.join(n))
        .collect();
    let manifest = format!(
        "mid\t{}\nold\t{}\nmid\t{}\nbad line\njpg\t{}\ngone\t{}\n",
        chan.join("m.opus").display(),
        chan.join("old.opus").display(),
        chan.join("m.opus").display(),
        chan.join("cover.jpg").display(),
        chan.join("gone.opus").display(),
    );

    let entries = collect_entries(&chan, &before, &after, &manifest);
    assert_eq!(
        entries,
        vec![
            LedgerEntry::new(Some("mid"), chan.join("m.opus")),
            LedgerEntry::new(None, chan.join("orphan.opus")),
        ]
    );
}
