//! Cover rendering through an external command-line tool.
//!
//! The tool is invoked as
//! `<command> [args..] <title> --subtitle <s> --style <key> --output-dir <dir> --filename <name>`
//! and must leave the image at `<dir>/<name>`.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use linkpub_shared::{CoverConfig, CoverSpec, CoverStyle, LinkPubError, Result};

/// Characters of stderr kept in a `RenderFailed` message.
const STDERR_TAIL: usize = 400;

pub struct CoverGenerator {
    command: String,
    args: Vec<String>,
}

impl CoverGenerator {
    pub fn new(config: &CoverConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }

    /// Render one cover and return the path of the written image.
    #[instrument(skip(self, spec), fields(style = %spec.style, title = %spec.title))]
    pub async fn generate(&self, spec: &CoverSpec) -> Result<PathBuf> {
        let style: CoverStyle = spec.style.parse()?;

        tokio::fs::create_dir_all(&spec.output_dir)
            .await
            .map_err(|e| LinkPubError::io(&spec.output_dir, e))?;

        let file_name = spec
            .file_name
            .clone()
            .unwrap_or_else(|| default_file_name(style));
        let output = spec.output_dir.join(&file_name);

        debug!(command = %self.command, file = %file_name, "spawning cover tool");

        let result = Command::new(&self.command)
            .args(&self.args)
            .arg("--subtitle")
            .arg(&spec.subtitle)
            .arg("--style")
            .arg(style.as_str())
            .arg("--output-dir")
            .arg(&spec.output_dir)
            .arg("--filename")
            .arg(&file_name)
            .arg("--")
            .arg(&spec.title)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                LinkPubError::RenderFailed(format!(
                    "failed to spawn `{}`: {e}. Is the cover tool installed?",
                    self.command
                ))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            warn!(status = ?result.status, "cover tool failed");
            return Err(LinkPubError::RenderFailed(format!(
                "`{}` exited with {}: {}",
                self.command,
                result.status,
                tail(stderr.trim(), STDERR_TAIL)
            )));
        }

        if !is_file(&output).await {
            return Err(LinkPubError::OutputMissing { path: output });
        }

        info!(path = %output.display(), "cover generated");
        Ok(output)
    }
}

/// `cover_<style>_<uuid v7>.png`; v7 ids sort by creation time.
fn default_file_name(style: CoverStyle) -> String {
    format!("cover_{}_{}.png", style.as_str(), Uuid::now_v7().simple())
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Last `max` characters of `text`.
fn tail(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    let start = text
        .char_indices()
        .nth(count - max)
        .map_or(0, |(idx, _)| idx);
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkpub_shared::ErrorKind;

    fn generator(command: &str, args: &[&str]) -> CoverGenerator {
        CoverGenerator::new(&CoverConfig {
            command: command.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            ..CoverConfig::default()
        })
    }

    #[test]
    fn default_names_are_unique() {
        let a = default_file_name(CoverStyle::Tech);
        let b = default_file_name(CoverStyle::Tech);
        assert!(a.starts_with("cover_tech_") && a.ends_with(".png"));
        assert_ne!(a, b);
    }

    #[test]
    fn tail_keeps_end_of_text() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("短文本", 10), "短文本");
        assert_eq!(tail("错误信息", 2), "信息");
    }

    #[tokio::test]
    async fn unknown_style_never_spawns() {
        let dir = tempfile::tempdir().unwrap();
        // A command that cannot exist: spawning it would yield RenderFailed.
        let cover = generator("/nonexistent/linkpub-cover-tool", &[]);
        let spec = CoverSpec::new("Title", "neon", dir.path());

        let err = cover.generate(&spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStyle);
    }

    #[tokio::test]
    async fn missing_tool_is_render_failed() {
        let dir = tempfile::tempdir().unwrap();
        let cover = generator("/nonexistent/linkpub-cover-tool", &[]);
        let spec = CoverSpec::new("Title", "tech", dir.path());

        let err = cover.generate(&spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RenderFailed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_render_failed() {
        let dir = tempfile::tempdir().unwrap();
        let cover = generator("sh", &["-c", "echo 'font not found' >&2; exit 3", "render"]);
        let spec = CoverSpec::new("Title", "swiss", dir.path());

        let err = cover.generate(&spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RenderFailed);
        assert!(err.to_string().contains("font not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn success_without_file_is_output_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cover = generator("true", &[]);
        let spec = CoverSpec::new("Title", "swiss", dir.path());

        let err = cover.generate(&spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutputMissing);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn writes_cover_via_tool() {
        const SCRIPT: &str = r#"
            while [ $# -gt 0 ]; do
              case "$1" in
                --output-dir) dir="$2"; shift ;;
                --filename) name="$2"; shift ;;
                --style) style="$2"; shift ;;
              esac
              shift
            done
            printf '%s' "$style" > "$dir/$name"
        "#;

        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("covers");
        let cover = generator("sh", &["-c", SCRIPT, "render"]);
        let mut spec = CoverSpec::new("Rust 异步编程", "GEEK", &out_dir);
        spec.file_name = Some("fixed.png".into());

        let path = cover.generate(&spec).await.unwrap();
        assert_eq!(path, out_dir.join("fixed.png"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "geek");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dash_title_is_passed_as_positional() {
        const SCRIPT: &str = r#"
            while [ $# -gt 0 ]; do
              case "$1" in
                --output-dir) dir="$2"; shift ;;
                --filename) name="$2"; shift ;;
                --) shift; title="$1"; break ;;
              esac
              shift
            done
            printf '%s' "$title" > "$dir/$name"
        "#;

        let dir = tempfile::tempdir().unwrap();
        let cover = generator("sh", &["-c", SCRIPT, "render"]);
        let mut spec = CoverSpec::new("--filename evil.png", "tech", dir.path());
        spec.file_name = Some("cover.png".into());

        let path = cover.generate(&spec).await.unwrap();
        assert_eq!(path, dir.path().join("cover.png"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "--filename evil.png");
        assert!(!dir.path().join("evil.png").exists());
    }
}
