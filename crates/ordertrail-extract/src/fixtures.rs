use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ordertrail_core::RawMessage;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A message on disk. Bodies may be inline or live in sibling files named by
/// `html_path` / `text_path`, relative to the JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageFixture {
    #[serde(flatten)]
    pub message: RawMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_path: Option<String>,
}

pub fn load_message_fixture(path: impl AsRef<Path>) -> Result<RawMessage> {
    let path = path.as_ref();
    let mut fixture: MessageFixture = read_json_file(path)?;
    hydrate_bodies(path, &mut fixture)?;
    Ok(fixture.message)
}

/// Every `*.json` fixture in `dir`, in file-name order.
pub fn load_message_fixtures(dir: impl AsRef<Path>) -> Result<Vec<RawMessage>> {
    let dir = dir.as_ref();
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("listing fixtures in {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();
    paths.iter().map(load_message_fixture).collect()
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn hydrate_bodies(fixture_path: &Path, fixture: &mut MessageFixture) -> Result<()> {
    let base = fixture_path.parent().unwrap_or_else(|| Path::new("."));
    if fixture.message.html_body.is_empty() {
        if let Some(rel_path) = &fixture.html_path {
            let html_path = base.join(rel_path);
            fixture.message.html_body = fs::read_to_string(&html_path)
                .with_context(|| format!("reading fixture html {}", html_path.display()))?;
        }
    }
    if fixture.message.text_body.is_empty() {
        if let Some(rel_path) = &fixture.text_path {
            let text_path = base.join(rel_path);
            fixture.message.text_body = fs::read_to_string(&text_path)
                .with_context(|| format!("reading fixture text {}", text_path.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_body_is_read_from_sibling_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        fs::write(dir.join("b.html"), "<p>Order ID: 42</p>").unwrap();
        fs::write(
            dir.join("b.json"),
            r#"{"id":"m-2","sender":"x@myntra.com","subject":"s","received_at":"2025-01-02T10:00:00Z","html_path":"b.html"}"#,
        )
        .unwrap();
        fs::write(
            dir.join("a.json"),
            r#"{"id":"m-1","sender":"x@hm.com","subject":"s","received_at":"2025-01-01T10:00:00Z","text_body":"hello"}"#,
        )
        .unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let messages = load_message_fixtures(dir).unwrap();
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m-1", "m-2"]);
        assert_eq!(messages[1].html_body, "<p>Order ID: 42</p>");
        assert_eq!(messages[0].text_body, "hello");
    }

    #[test]
    fn missing_html_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("m.json");
        fs::write(
            &path,
            r#"{"id":"m","sender":"x","subject":"s","received_at":"2025-01-01T00:00:00Z","html_path":"gone.html"}"#,
        )
        .unwrap();
        let err = load_message_fixture(&path).unwrap_err();
        assert!(format!("{err:#}").contains("gone.html"));
    }
}
