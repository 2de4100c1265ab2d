//! Feed documents, a mock channel endpoint and a scripted fetch tool

use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use ytcast::feed::video_id_from_url;
use ytcast::fetch::{FetchRequest, FetchTool, ToolOutcome};
use ytcast::{DedupArchive, Result};

/// YouTube-style Atom document with one entry per `(id, published)`
pub fn atom_feed(entries: &[(&str, &str)]) -> String {
    let body: String = entries
        .iter()
        .map(|(id, published)| {
            format!(
                "<entry>\
                   <id>yt:video:{id}</id>\
                   <yt:videoId>{id}</yt:videoId>\
                   <title>Episode {id}</title>\
                   <link rel=\"alternate\" href=\"https://www.youtube.com/watch?v={id}\"/>\
                   <published>{published}</published>\
                 </entry>"
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <feed xmlns=\"http://www.w3.org/2005/Atom\" \
               xmlns:yt=\"http://www.youtube.com/xml/schemas/2015\">\
           <title>Test Channel</title>{body}</feed>"
    )
}

/// Mock endpoint serving `body` at `route`
pub async fn serve_feed(route: &str, body: String) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

/// Behaves like yt-dlp with a download archive: skips recorded ids, writes
/// `<id>.opus` into the output directory, records the id and reports the
/// file through the manifest
#[derive(Default)]
pub struct ScriptedTool {
    /// Every request received, in order
    pub requests: Mutex<Vec<FetchRequest>>,
    /// Ids actually downloaded, in order
    pub downloaded: Mutex<Vec<String>>,
}

#[async_trait]
impl FetchTool for ScriptedTool {
    async fn fetch(&self, request: &FetchRequest) -> Result<ToolOutcome> {
        self.requests.lock().unwrap().push(request.clone());

        let out_dir = Path::new(&request.output_template).parent().unwrap();
        let archive = DedupArchive::new(&request.archive, "youtube");
        let mut manifest = String::new();
        for url in &request.urls {
            let Some(id) = video_id_from_url(url) else {
                continue;
            };
            if archive.contains(&id)? {
                continue;
            }
            let file = out_dir.join(format!("{id}.opus"));
            std::fs::write(&file, format!("audio for {id}"))?;
            archive.record(&id)?;
            manifest.push_str(&format!("{id}\t{}\n", file.display()));
            self.downloaded.lock().unwrap().push(id);
        }
        std::fs::write(&request.manifest, manifest)?;
        Ok(ToolOutcome { exit_code: Some(0) })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
