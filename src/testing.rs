//! In-memory stand-ins for the network and ffmpeg, shared by unit tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::audio::{AudioNormalizer, AudioProber, LoudnessMeasurement, LoudnormStats, NormalizeReport};
use crate::error::{FetchError, ProbeError, Result};
use crate::feed::Fetcher;

/// Serves a feed document and audio bodies keyed by URL
#[derive(Default)]
pub struct FakeFetcher {
    feed: Mutex<Vec<u8>>,
    audio: Mutex<HashMap<String, Vec<u8>>>,
    downloads: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_feed(&self, xml: impl Into<Vec<u8>>) {
        *self.feed.lock().unwrap() = xml.into();
    }

    pub fn set_audio(&self, url: &str, bytes: impl Into<Vec<u8>>) {
        self.audio.lock().unwrap().insert(url.to_string(), bytes.into());
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch_feed(&self, _url: &str) -> Result<Vec<u8>> {
        Ok(self.feed.lock().unwrap().clone())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let body = self.audio.lock().unwrap().get(url).cloned();
        let body = body.ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })?;

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, &body)?;
        Ok(body.len() as u64)
    }
}

/// Reports levels chosen per file content
pub struct FakeProber {
    default_peak: Option<f64>,
    peaks: Mutex<HashMap<Vec<u8>, Option<f64>>>,
    delays: Mutex<HashMap<Vec<u8>, Duration>>,
    probes: AtomicUsize,
}

impl FakeProber {
    pub fn with_peak(peak: f64) -> Self {
        Self {
            default_peak: Some(peak),
            peaks: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            probes: AtomicUsize::new(0),
        }
    }

    /// `None` simulates a report without a `max_volume` line
    pub fn set_peak(&self, content: &[u8], peak: Option<f64>) {
        self.peaks.lock().unwrap().insert(content.to_vec(), peak);
    }

    pub fn set_delay(&self, content: &[u8], delay: Duration) {
        self.delays.lock().unwrap().insert(content.to_vec(), delay);
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioProber for FakeProber {
    async fn probe(&self, path: &Path) -> Result<LoudnessMeasurement> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let content = std::fs::read(path)?;

        let delay = self.delays.lock().unwrap().get(&content).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let peak = self
            .peaks
            .lock()
            .unwrap()
            .get(&content)
            .copied()
            .unwrap_or(self.default_peak);
        Ok(LoudnessMeasurement {
            max_peak_db: peak,
            mean_volume_db: Some(-20.0),
        })
    }

    async fn probe_integrated(&self, path: &Path) -> Result<LoudnormStats> {
        if !path.is_file() {
            return Err(ProbeError::NoMeasurement {
                path: path.display().to_string(),
            }
            .into());
        }
        Ok(loudnorm_stats(-16.0))
    }
}

fn loudnorm_stats(output_i: f64) -> LoudnormStats {
    LoudnormStats {
        input_i: Some(output_i),
        input_tp: None,
        input_lra: None,
        input_thresh: None,
        output_i,
        output_tp: None,
        output_lra: None,
        output_thresh: None,
    }
}

/// Writes `normalized:` + input bytes and counts invocations
#[derive(Default)]
pub struct FakeNormalizer {
    gains: AtomicUsize,
    full: AtomicUsize,
}

impl FakeNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gain_calls(&self) -> usize {
        self.gains.load(Ordering::SeqCst)
    }

    pub fn full_calls(&self) -> usize {
        self.full.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.gain_calls() + self.full_calls()
    }

    fn render(input: &Path, output: &Path) -> Result<()> {
        let mut bytes = b"normalized:".to_vec();
        bytes.extend(std::fs::read(input)?);
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output, bytes)?;
        Ok(())
    }
}

#[async_trait]
impl AudioNormalizer for FakeNormalizer {
    async fn apply_gain(&self, input: &Path, output: &Path, _gain_db: f64) -> Result<NormalizeReport> {
        self.gains.fetch_add(1, Ordering::SeqCst);
        Self::render(input, output)?;
        Ok(NormalizeReport::default())
    }

    async fn apply_full_normalization(&self, input: &Path, output: &Path) -> Result<NormalizeReport> {
        self.full.fetch_add(1, Ordering::SeqCst);
        Self::render(input, output)?;
        Ok(NormalizeReport {
            loudnorm: Some(loudnorm_stats(-24.0)),
        })
    }
}

/// RSS document with one item per `(title, audio url)`
pub fn feed_xml(items: &[(&str, Option<&str>)]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\">\n<channel>\n\
         <title>Test Feed</title>\n<link>https://example.com</link>\n<description>Test</description>\n",
    );
    for (title, audio) in items {
        xml.push_str(&format!("<item>\n<title>{}</title>\n<guid>{}</guid>\n", title, title));
        if let Some(url) = audio {
            xml.push_str(&format!(
                "<enclosure url=\"{}\" type=\"audio/mpeg\" length=\"0\"/>\n",
                url
            ));
        }
        xml.push_str("</item>\n");
    }
    xml.push_str("</channel>\n</rss>\n");
    xml
}
