//! Configuration fixtures rooted in a temporary directory

use std::path::Path;
use tempfile::TempDir;
use ytcast::Config;

/// Configuration with every path inside `dir`
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.paths.channels_file = dir.path().join("channels.json");
    config.paths.base_dir = dir.path().join("library");
    config.paths.archive_dir = dir.path().join("state").join("archive");
    config.paths.ledger_path = dir.path().join("state").join("ledger.tsv");
    config.server.probe_address = "127.0.0.1:9".parse().unwrap();
    config
}

/// Write a channel document with one `{name, url}` entry per pair
pub fn write_channels(config: &Config, channels: &[(&str, String)]) {
    let list: Vec<serde_json::Value> = channels
        .iter()
        .map(|(name, url)| serde_json::json!({ "name": name, "url": url }))
        .collect();
    write_file(
        &config.paths.channels_file,
        &serde_json::json!({ "channels": list }).to_string(),
    );
}

/// Write `content` to `path`, creating parent directories
pub fn write_file(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}
