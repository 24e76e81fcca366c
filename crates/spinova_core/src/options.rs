use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use engine_logging::engine_debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// External downloader binaries the extraction engine can delegate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalDownloader {
    Aria2c,
    Avconv,
    Axel,
    Curl,
    Ffmpeg,
    Httpie,
    Wget,
}

impl ExternalDownloader {
    pub const ALL: [ExternalDownloader; 7] = [
        Self::Aria2c,
        Self::Avconv,
        Self::Axel,
        Self::Curl,
        Self::Ffmpeg,
        Self::Httpie,
        Self::Wget,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aria2c => "aria2c",
            Self::Avconv => "avconv",
            Self::Axel => "axel",
            Self::Curl => "curl",
            Self::Ffmpeg => "ffmpeg",
            Self::Httpie => "httpie",
            Self::Wget => "wget",
        }
    }
}

impl FromStr for ExternalDownloader {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown downloader {wanted:?}"))
    }
}

impl fmt::Display for ExternalDownloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single option value as handed to the extraction engine.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// A boolean switch that is on. Switches that are off are never forwarded.
    Flag,
    Int(u32),
    Float(f64),
    Text(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Flag => write!(f, "true"),
            OptionValue::Int(v) => write!(f, "{v}"),
            OptionValue::Float(v) => write!(f, "{v}"),
            OptionValue::Text(v) => f.write_str(v),
        }
    }
}

/// Engine option overrides. Every field is optional; unset fields keep the
/// extraction engine's own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub force_ipv4: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub force_ipv6: bool,
    /// Seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_timeout: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrent_fragments: Option<u32>,
    #[serde(skip_serializing_if = "is_false")]
    pub skip_unavailable_fragments: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub abort_on_unavailable_fragments: bool,
    /// e.g. `500K`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_rate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_access_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_sleep: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub resize_buffer: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub no_resize_buffer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_chunk_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloader: Option<ExternalDownloader>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg_location: Option<PathBuf>,
    /// Only forwarded when the file exists at download time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie_file: Option<PathBuf>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl EngineOptions {
    /// Builds options from a loosely typed mapping, as persisted from free-text
    /// settings fields. Values that are empty, `null`, `false` or that cannot be
    /// coerced to the option's type are dropped.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut options = EngineOptions::default();
        for (key, value) in map {
            match key.as_str() {
                "proxy" => options.proxy = text(value),
                "force_ipv4" => options.force_ipv4 = flag(value),
                "force_ipv6" => options.force_ipv6 = flag(value),
                "socket_timeout" => options.socket_timeout = float(value),
                "concurrent_fragments" => options.concurrent_fragments = int(value),
                "skip_unavailable_fragments" => options.skip_unavailable_fragments = flag(value),
                "abort_on_unavailable_fragments" => {
                    options.abort_on_unavailable_fragments = flag(value)
                }
                "limit_rate" => options.limit_rate = text(value),
                "retries" => options.retries = int(value),
                "file_access_retries" => options.file_access_retries = int(value),
                "fragment_retries" => options.fragment_retries = int(value),
                "retry_sleep" => options.retry_sleep = text(value),
                "buffer_size" => options.buffer_size = text(value),
                "resize_buffer" => options.resize_buffer = flag(value),
                "no_resize_buffer" => options.no_resize_buffer = flag(value),
                "http_chunk_size" => options.http_chunk_size = text(value),
                "downloader" => {
                    options.downloader = text(value).and_then(|name| name.parse().ok())
                }
                "ffmpeg_location" | "ffmpeg_path" => {
                    options.ffmpeg_location = text(value).map(PathBuf::from)
                }
                "cookie_file" | "cookiefile" => {
                    options.cookie_file = text(value).map(PathBuf::from)
                }
                other => engine_debug!("Ignoring unknown engine option {:?}", other),
            }
        }
        options
    }

    /// The options actually handed to the extraction engine, in a stable order.
    ///
    /// Unset, empty and switched-off options are absent, as is a cookie file
    /// that does not exist on disk.
    pub fn forwarded(&self) -> Vec<(&'static str, OptionValue)> {
        let mut out = Vec::new();
        push_text(&mut out, "proxy", &self.proxy);
        push_flag(&mut out, "force_ipv4", self.force_ipv4);
        push_flag(&mut out, "force_ipv6", self.force_ipv6);
        if let Some(timeout) = self.socket_timeout.filter(|t| *t > 0.0) {
            out.push(("socket_timeout", OptionValue::Float(timeout)));
        }
        push_int(&mut out, "concurrent_fragments", self.concurrent_fragments);
        push_flag(
            &mut out,
            "skip_unavailable_fragments",
            self.skip_unavailable_fragments,
        );
        push_flag(
            &mut out,
            "abort_on_unavailable_fragments",
            self.abort_on_unavailable_fragments,
        );
        push_text(&mut out, "limit_rate", &self.limit_rate);
        push_int(&mut out, "retries", self.retries);
        push_int(&mut out, "file_access_retries", self.file_access_retries);
        push_int(&mut out, "fragment_retries", self.fragment_retries);
        push_text(&mut out, "retry_sleep", &self.retry_sleep);
        push_text(&mut out, "buffer_size", &self.buffer_size);
        push_flag(&mut out, "resize_buffer", self.resize_buffer);
        push_flag(&mut out, "no_resize_buffer", self.no_resize_buffer);
        push_text(&mut out, "http_chunk_size", &self.http_chunk_size);
        if let Some(downloader) = self.downloader {
            out.push(("downloader", OptionValue::Text(downloader.to_string())));
        }
        if let Some(ffmpeg) = self
            .ffmpeg_location
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
        {
            out.push((
                "ffmpeg_location",
                OptionValue::Text(ffmpeg.to_string_lossy().into_owned()),
            ));
        }
        if let Some(cookie) = self.cookie_file.as_ref().filter(|p| p.is_file()) {
            out.push((
                "cookiefile",
                OptionValue::Text(cookie.to_string_lossy().into_owned()),
            ));
        }
        out
    }

    /// Serializable mapping holding only the options that are set.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

fn push_text(out: &mut Vec<(&'static str, OptionValue)>, name: &'static str, v: &Option<String>) {
    if let Some(v) = v.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        out.push((name, OptionValue::Text(v.to_string())));
    }
}

fn push_int(out: &mut Vec<(&'static str, OptionValue)>, name: &'static str, v: Option<u32>) {
    if let Some(v) = v {
        out.push((name, OptionValue::Int(v)));
    }
}

fn push_flag(out: &mut Vec<(&'static str, OptionValue)>, name: &'static str, on: bool) {
    if on {
        out.push((name, OptionValue::Flag));
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn int(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn float(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v: &f64| v.is_finite() && *v > 0.0)
}

fn flag(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}
