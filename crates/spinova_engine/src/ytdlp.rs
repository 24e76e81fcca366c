use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::OnceLock;

use async_trait::async_trait;
use engine_logging::{engine_debug, engine_info, engine_trace};
use regex::Regex;
use spinova_core::{ErrorKind, OptionValue};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::extractor::{DownloadRequest, EngineProgress, ExtractionError, Extractor, ProgressHook};

const PROGRESS_MARKER: &str = "spinova-progress";
const PROGRESS_TEMPLATE: &str = "download:spinova-progress %(progress.status)s \
%(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s";

/// Runs the `yt-dlp` executable as the extraction engine.
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    program: PathBuf,
}

impl YtDlpExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Uses `SPINOVA_YTDLP` when set, otherwise `yt-dlp` from `PATH`.
    pub fn locate() -> Self {
        match std::env::var_os("SPINOVA_YTDLP") {
            Some(path) if !path.is_empty() => Self::new(path),
            _ => Self::new("yt-dlp"),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.stdin(Stdio::null()).kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn prepare(&self) -> Result<(), ExtractionError> {
        let output = self
            .command()
            .arg("--version")
            .output()
            .await
            .map_err(|err| {
                ExtractionError::new(
                    ErrorKind::UnknownError,
                    format!("{} is not available: {err}", self.program.display()),
                )
            })?;
        if !output.status.success() {
            return Err(ExtractionError::new(
                ErrorKind::UnknownError,
                format!("{} --version exited with {}", self.program.display(), output.status),
            ));
        }
        engine_info!(
            "Using {} version {}",
            self.program.display(),
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        hook: &dyn ProgressHook,
    ) -> Result<(), ExtractionError> {
        let args = build_args(request);
        engine_debug!("Running {} {:?}", self.program.display(), args);

        let mut child = self
            .command()
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                ExtractionError::new(
                    ErrorKind::UnknownError,
                    format!("could not run {}: {err}", self.program.display()),
                )
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let read_stdout = async {
            let Some(stdout) = stdout else { return };
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_progress_line(&line) {
                    Some(progress) => hook.on_progress(progress),
                    None => engine_trace!("yt-dlp: {}", line),
                }
            }
        };
        let read_stderr = async {
            let mut collected = Vec::new();
            let Some(stderr) = stderr else {
                return collected;
            };
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                engine_debug!("yt-dlp stderr: {}", line);
                collected.push(line);
            }
            collected
        };
        let ((), stderr_lines) = tokio::join!(read_stdout, read_stderr);

        let status = child.wait().await.map_err(|err| {
            ExtractionError::new(
                ErrorKind::UnknownError,
                format!("lost track of yt-dlp: {err}"),
            )
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(failure_from(status, &stderr_lines))
        }
    }
}

/// Command line for one download. Every forwarded option becomes its flag;
/// the URL always comes last, after `--`.
pub(crate) fn build_args(request: &DownloadRequest) -> Vec<String> {
    let mut args = vec![
        "--newline".to_string(),
        "--no-colors".to_string(),
        "--progress-template".to_string(),
        PROGRESS_TEMPLATE.to_string(),
    ];
    for (name, value) in &request.options {
        args.push(flag_for(name));
        match value {
            OptionValue::Flag => {}
            other => args.push(other.to_string()),
        }
    }
    args.extend([
        "-f".to_string(),
        request.format_selector.clone(),
        "-o".to_string(),
        request.output_template.clone(),
        "--".to_string(),
        request.url.clone(),
    ]);
    args
}

fn flag_for(option: &str) -> String {
    match option {
        "cookiefile" => "--cookies".to_string(),
        other => format!("--{}", other.replace('_', "-")),
    }
}

fn progress_regex() -> Option<&'static Regex> {
    static PROGRESS_RE: OnceLock<Option<Regex>> = OnceLock::new();
    PROGRESS_RE
        .get_or_init(|| Regex::new(r"^spinova-progress\s+(\w+)\s+(\S+)\s+(\S+)\s+(\S+)\s*$").ok())
        .as_ref()
}

fn already_downloaded_regex() -> Option<&'static Regex> {
    static ALREADY_RE: OnceLock<Option<Regex>> = OnceLock::new();
    ALREADY_RE
        .get_or_init(|| Regex::new(r"^\[download\]\s+(.+) has already been downloaded").ok())
        .as_ref()
}

/// Parses one stdout line. Lines that carry no progress give `None`.
pub(crate) fn parse_progress_line(line: &str) -> Option<EngineProgress> {
    let line = line.trim();
    if line.starts_with(PROGRESS_MARKER) {
        let caps = progress_regex()?.captures(line)?;
        let status = caps.get(1)?.as_str();
        if status == "finished" {
            return Some(EngineProgress::FileFinished { filename: None });
        }
        if status != "downloading" {
            return None;
        }
        return Some(EngineProgress::Downloading {
            downloaded_bytes: parse_bytes(caps.get(2)?.as_str()).unwrap_or(0),
            total_bytes: parse_bytes(caps.get(3)?.as_str()),
            total_bytes_estimate: parse_bytes(caps.get(4)?.as_str()),
        });
    }
    already_downloaded_regex()?
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|name| EngineProgress::FileFinished {
            filename: Some(name.as_str().to_string()),
        })
}

/// yt-dlp prints `NA` for unknown fields and floats for estimates.
fn parse_bytes(field: &str) -> Option<u64> {
    if let Ok(value) = field.parse::<u64>() {
        return Some(value);
    }
    field
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
        .map(|value| value as u64)
}

pub(crate) fn classify_failure(stderr: &str) -> ErrorKind {
    const EXTRACTOR: [&str; 4] = [
        "Unsupported URL",
        "Unable to extract",
        "ExtractorError",
        "is not a valid URL",
    ];
    const DOWNLOAD: [&str; 7] = [
        "HTTP Error",
        "Unable to download",
        "Connection refused",
        "Connection reset",
        "timed out",
        "Temporary failure in name resolution",
        "DownloadError",
    ];
    if EXTRACTOR.iter().any(|needle| stderr.contains(needle)) {
        ErrorKind::ExtractorError
    } else if DOWNLOAD.iter().any(|needle| stderr.contains(needle)) {
        ErrorKind::DownloadError
    } else {
        ErrorKind::UnknownError
    }
}

fn failure_from(status: ExitStatus, stderr_lines: &[String]) -> ExtractionError {
    let joined = stderr_lines.join("\n");
    let message = stderr_lines
        .iter()
        .rev()
        .find_map(|line| line.trim().strip_prefix("ERROR:"))
        .or_else(|| {
            stderr_lines
                .iter()
                .rev()
                .map(|line| line.trim())
                .find(|line| !line.is_empty())
        })
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| format!("yt-dlp exited with {status}"));
    ExtractionError::new(classify_failure(&joined), message)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use spinova_core::{ErrorKind, OptionValue};

    use super::{build_args, classify_failure, parse_progress_line};
    use crate::extractor::{DownloadRequest, EngineProgress};

    fn request(options: Vec<(&'static str, OptionValue)>) -> DownloadRequest {
        DownloadRequest {
            url: "https://example.com/watch?v=1".into(),
            format_selector: "bestaudio".into(),
            output_directory: PathBuf::from("out"),
            output_template: "out/%(title)s.%(ext)s".into(),
            options,
        }
    }

    #[test]
    fn progress_line_with_exact_total() {
        let progress = parse_progress_line("spinova-progress downloading 1024 4096 NA");
        assert_eq!(
            progress,
            Some(EngineProgress::Downloading {
                downloaded_bytes: 1024,
                total_bytes: Some(4096),
                total_bytes_estimate: None,
            })
        );
    }

    #[test]
    fn progress_line_with_float_estimate() {
        let progress = parse_progress_line("spinova-progress downloading 10 NA 2048.5");
        assert_eq!(
            progress,
            Some(EngineProgress::Downloading {
                downloaded_bytes: 10,
                total_bytes: None,
                total_bytes_estimate: Some(2048),
            })
        );
    }

    #[test]
    fn finished_lines_are_not_progress() {
        assert_eq!(
            parse_progress_line("spinova-progress finished 4096 4096 NA"),
            Some(EngineProgress::FileFinished { filename: None })
        );
        assert_eq!(
            parse_progress_line("[download] clip.mp4 has already been downloaded"),
            Some(EngineProgress::FileFinished {
                filename: Some("clip.mp4".into())
            })
        );
        assert_eq!(parse_progress_line("[youtube] 1: Downloading webpage"), None);
    }

    #[test]
    fn options_map_to_flags_and_url_comes_last() {
        let args = build_args(&request(vec![
            ("proxy", OptionValue::Text("socks5://127.0.0.1:1080".into())),
            ("force_ipv4", OptionValue::Flag),
            ("retries", OptionValue::Int(3)),
            ("cookiefile", OptionValue::Text("cookie.txt".into())),
        ]));

        let joined = args.join(" ");
        assert!(joined.contains("--proxy socks5://127.0.0.1:1080 --force-ipv4 --retries 3"));
        assert!(joined.contains("--cookies cookie.txt"));
        assert!(joined.contains("-f bestaudio -o out/%(title)s.%(ext)s"));
        assert_eq!(args.last().map(String::as_str), Some("https://example.com/watch?v=1"));
        assert_eq!(args[args.len() - 2], "--");
    }

    #[test]
    fn stderr_is_classified() {
        assert_eq!(
            classify_failure("ERROR: Unsupported URL: https://nope"),
            ErrorKind::ExtractorError
        );
        assert_eq!(
            classify_failure("ERROR: unable to download video data: HTTP Error 403: Forbidden"),
            ErrorKind::DownloadError
        );
        assert_eq!(classify_failure("something odd"), ErrorKind::UnknownError);
    }
}
