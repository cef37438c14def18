use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::{debug, info, warn};

use crate::config::{ChannelConfig, Config};
use crate::error::{ConfigError, FeedError, LoudcastError, Result};
use crate::feed::types::{Episode, SourceFeed};
use crate::files::published_tempfile;
use crate::pipeline::FeedMapping;

const ITUNES_NS: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";
const AUDIO_MIME: &str = "audio/mpeg";
const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Maps local artifact paths to the URLs they are served from
#[derive(Debug, Clone)]
pub struct PublicLocator {
    base_url: Option<String>,
    root: PathBuf,
}

impl PublicLocator {
    pub fn new(base_url: Option<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
            root: root.into(),
        }
    }

    /// `base_url` joined with the path below `root`. Paths outside `root`
    /// fall back to the bare filename; without a base URL the local path
    /// itself is used.
    pub fn public_url(&self, local_path: &Path) -> String {
        let Some(base) = &self.base_url else {
            return local_path.display().to_string();
        };

        let path = without_cur_dir(local_path);
        let root = without_cur_dir(&self.root);
        let relative: Vec<String> = match path.strip_prefix(&root) {
            Ok(rel) if rel.components().all(|c| matches!(c, Component::Normal(_))) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect(),
            _ => local_path
                .file_name()
                .map(|name| vec![name.to_string_lossy().into_owned()])
                .unwrap_or_default(),
        };

        format!("{}/{}", base, relative.join("/"))
    }
}

fn without_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Reformat a source timestamp as RFC 2822 in the fixed publishing offset.
///
/// Accepts RFC 2822, RFC 3339, or a bare `YYYY-MM-DDTHH:MM:SS` prefix read
/// in the publishing offset. Returns `None` for anything else.
pub fn format_pub_date(raw: &str, offset: FixedOffset) -> Option<String> {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .or_else(|| {
            let prefix = raw.get(..19)?;
            let naive = NaiveDateTime::parse_from_str(prefix, "%Y-%m-%dT%H:%M:%S").ok()?;
            offset.from_local_datetime(&naive).single()
        })?;

    Some(parsed.with_timezone(&offset).format(PUB_DATE_FORMAT).to_string())
}

/// Serialized feed, ready to be written
#[derive(Debug, Clone)]
pub struct FeedDocument {
    xml: Vec<u8>,
    items: usize,
    local_enclosures: usize,
}

impl FeedDocument {
    pub fn as_bytes(&self) -> &[u8] {
        &self.xml
    }

    /// Items in the document
    pub fn items(&self) -> usize {
        self.items
    }

    /// Items whose enclosure points at a local artifact
    pub fn local_enclosures(&self) -> usize {
        self.local_enclosures
    }

    /// Replace `path` with this document. Readers never see a partial file.
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        let xml = self.xml.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, &xml))
            .await
            .map_err(|e| LoudcastError::generic(format!("Feed write task failed: {}", e)))?
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut partial = published_tempfile(".feed-", ".xml").tempfile_in(&dir)?;
    partial.write_all(bytes)?;
    partial.as_file().sync_all()?;
    partial.persist(path).map_err(|e| FeedError::Write {
        reason: format!("{}: {}", path.display(), e.error),
    })?;

    info!("Wrote feed to {:?}", path);
    Ok(())
}

/// Produces the republished feed from the source feed and the artifacts
#[derive(Debug, Clone)]
pub struct FeedRewriter {
    overrides: ChannelConfig,
    locator: PublicLocator,
    offset: FixedOffset,
}

impl FeedRewriter {
    pub fn new(overrides: ChannelConfig, locator: PublicLocator, offset: FixedOffset) -> Self {
        Self {
            overrides,
            locator,
            offset,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let offset = FixedOffset::east_opt(config.feed.utc_offset_minutes * 60).ok_or_else(|| {
            ConfigError::InvalidValue {
                key: "feed.utc_offset_minutes".to_string(),
                value: config.feed.utc_offset_minutes.to_string(),
            }
        })?;

        Ok(Self::new(
            config.channel.clone(),
            PublicLocator::new(config.feed.public_base_url.clone(), &config.storage.public_root),
            offset,
        ))
    }

    /// Build the rewritten document.
    ///
    /// Items follow source order. Mapped episodes get an enclosure for
    /// their artifact with its exact length; unmapped episodes keep their
    /// source audio URL without a length; excluded episodes are left out.
    pub fn rewrite(&self, feed: &SourceFeed, mapping: &FeedMapping) -> Result<FeedDocument> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        let mut items = 0;
        let mut local_enclosures = 0;

        emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

        let mut rss = BytesStart::new("rss");
        rss.push_attribute(("version", "2.0"));
        rss.push_attribute(("xmlns:itunes", ITUNES_NS));
        emit(&mut writer, Event::Start(rss))?;
        emit(&mut writer, Event::Start(BytesStart::new("channel")))?;

        self.write_channel(&mut writer, feed)?;

        for episode in &feed.episodes {
            if mapping.is_excluded(episode.index) {
                debug!("Leaving {} out of the feed", episode.label());
                continue;
            }
            if self.write_item(&mut writer, episode, mapping)? {
                local_enclosures += 1;
            }
            items += 1;
        }

        emit(&mut writer, Event::End(BytesEnd::new("channel")))?;
        emit(&mut writer, Event::End(BytesEnd::new("rss")))?;

        let mut xml = writer.into_inner();
        xml.push(b'\n');

        Ok(FeedDocument {
            xml,
            items,
            local_enclosures,
        })
    }

    fn write_channel(&self, writer: &mut Writer<Vec<u8>>, feed: &SourceFeed) -> Result<()> {
        let source = &feed.channel;
        let overrides = &self.overrides;

        text_element(writer, "title", overrides.title.as_deref().unwrap_or(&source.title))?;
        text_element(writer, "link", overrides.link.as_deref().unwrap_or(&source.link))?;
        text_element(
            writer,
            "description",
            overrides.description.as_deref().unwrap_or(&source.description),
        )?;

        if let Some(language) = overrides.language.as_deref().or(source.language.as_deref()) {
            text_element(writer, "language", language)?;
        }

        if let Some(image) = overrides.itunes_image.as_deref().or(source.itunes_image.as_deref()) {
            let mut element = BytesStart::new("itunes:image");
            element.push_attribute(("href", image));
            emit(writer, Event::Empty(element))?;
        }

        if let Some(category) = overrides
            .itunes_category
            .as_deref()
            .or(source.itunes_category.as_deref())
        {
            let mut element = BytesStart::new("itunes:category");
            element.push_attribute(("text", category));
            emit(writer, Event::Empty(element))?;
        }

        let explicit = match overrides.itunes_explicit {
            Some(true) => Some("yes"),
            Some(false) => Some("no"),
            None => source.itunes_explicit.as_deref(),
        };
        if let Some(explicit) = explicit {
            text_element(writer, "itunes:explicit", explicit)?;
        }

        Ok(())
    }

    /// Returns whether the item's enclosure points at a local artifact
    fn write_item(
        &self,
        writer: &mut Writer<Vec<u8>>,
        episode: &Episode,
        mapping: &FeedMapping,
    ) -> Result<bool> {
        emit(writer, Event::Start(BytesStart::new("item")))?;

        text_element(writer, "title", &episode.title)?;
        text_element(writer, "description", &episode.description)?;
        if let Some(link) = &episode.link {
            text_element(writer, "link", link)?;
        }

        if let Some(guid) = &episode.guid {
            let mut element = BytesStart::new("guid");
            element.push_attribute(("isPermaLink", if guid.permalink { "true" } else { "false" }));
            emit(writer, Event::Start(element))?;
            emit(writer, Event::Text(BytesText::new(&guid.value)))?;
            emit(writer, Event::End(BytesEnd::new("guid")))?;
        }

        if let Some(raw) = &episode.published_at {
            match format_pub_date(raw, self.offset) {
                Some(formatted) => text_element(writer, "pubDate", &formatted)?,
                None => {
                    warn!("Unrecognized pubDate {:?} on {}; copied as-is", raw, episode.label());
                    text_element(writer, "pubDate", raw)?;
                }
            }
        }

        let local = match mapping.artifact_for(episode.index) {
            Some(artifact) => {
                let url = self.locator.public_url(&artifact.local_path);
                let length = artifact.size_bytes.to_string();
                let mut element = BytesStart::new("enclosure");
                element.push_attribute(("url", url.as_str()));
                element.push_attribute(("type", AUDIO_MIME));
                element.push_attribute(("length", length.as_str()));
                emit(writer, Event::Empty(element))?;
                true
            }
            None => {
                if let Some(url) = &episode.source_audio_url {
                    let mut element = BytesStart::new("enclosure");
                    element.push_attribute(("url", url.as_str()));
                    element.push_attribute(("type", AUDIO_MIME));
                    emit(writer, Event::Empty(element))?;
                }
                false
            }
        };

        emit(writer, Event::End(BytesEnd::new("item")))?;
        Ok(local)
    }
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer.write_event(event).map_err(|e| {
        FeedError::Write {
            reason: e.to_string(),
        }
        .into()
    })
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    if text.is_empty() {
        return emit(writer, Event::Empty(BytesStart::new(name)));
    }
    emit(writer, Event::Start(BytesStart::new(name)))?;
    emit(writer, Event::Text(BytesText::new(text)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContentHash;
    use crate::feed::parse_feed;
    use crate::feed::types::{ChannelInfo, EpisodeGuid, TypedLink};
    use crate::pipeline::Artifact;
    use tempfile::tempdir;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn episode(index: usize, audio: Option<&str>, pub_date: Option<&str>) -> Episode {
        Episode {
            index,
            title: format!("Episode {}", index),
            description: "News & weather".to_string(),
            link: None,
            guid: Some(EpisodeGuid {
                value: format!("guid-{}", index),
                permalink: false,
            }),
            published_at: pub_date.map(str::to_string),
            links: audio.map(|url| TypedLink::new(url, "audio/mpeg")).into_iter().collect(),
            source_audio_url: audio.map(str::to_string),
        }
    }

    fn feed(episodes: Vec<Episode>) -> SourceFeed {
        SourceFeed {
            channel: ChannelInfo {
                title: "Upstream".to_string(),
                link: "https://example.com".to_string(),
                description: "Upstream description".to_string(),
                language: Some("ja".to_string()),
                ..Default::default()
            },
            episodes,
        }
    }

    fn rewriter(base: Option<&str>) -> FeedRewriter {
        FeedRewriter::new(
            ChannelConfig::default(),
            PublicLocator::new(base.map(str::to_string), "."),
            jst(),
        )
    }

    fn render(doc: &FeedDocument) -> String {
        String::from_utf8(doc.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn test_pub_date_formats() {
        assert_eq!(
            format_pub_date("Mon, 01 Jan 2024 22:00:00 +0000", jst()).as_deref(),
            Some("Tue, 02 Jan 2024 07:00:00 +0900")
        );
        assert_eq!(
            format_pub_date("2024-01-02T07:00:00+09:00", jst()).as_deref(),
            Some("Tue, 02 Jan 2024 07:00:00 +0900")
        );
        assert_eq!(
            format_pub_date("2024-01-02T07:00:00", jst()).as_deref(),
            Some("Tue, 02 Jan 2024 07:00:00 +0900")
        );
        assert_eq!(format_pub_date("yesterday", jst()), None);
    }

    #[test]
    fn test_public_url() {
        let locator = PublicLocator::new(Some("https://cdn.example.com/pod/".to_string()), ".");
        assert_eq!(
            locator.public_url(Path::new("output/abc_ep1.mp3")),
            "https://cdn.example.com/pod/output/abc_ep1.mp3"
        );
        assert_eq!(
            locator.public_url(Path::new("./output/abc_ep1.mp3")),
            "https://cdn.example.com/pod/output/abc_ep1.mp3"
        );

        let rooted = PublicLocator::new(Some("https://cdn.example.com".to_string()), "/srv/site");
        assert_eq!(
            rooted.public_url(Path::new("/elsewhere/ep1.mp3")),
            "https://cdn.example.com/ep1.mp3"
        );

        let local = PublicLocator::new(None, ".");
        assert_eq!(local.public_url(Path::new("output/ep1.mp3")), "output/ep1.mp3");
    }

    #[test]
    fn test_enclosures_follow_mapping() {
        let source = feed(vec![
            episode(0, Some("https://up.example.com/ep0.mp3"), Some("2024-01-02T07:00:00")),
            episode(1, Some("https://up.example.com/ep1.mp3?x=1&y=2"), None),
            episode(2, None, None),
        ]);

        let mut mapping = FeedMapping::new();
        mapping.insert(
            source.episodes[0].clone(),
            Artifact {
                content_hash: Some(ContentHash::of_bytes(b"ep0")),
                local_path: PathBuf::from("output/h_ep0.mp3"),
                source_url: "https://up.example.com/ep0.mp3".to_string(),
                size_bytes: 1234,
            },
        );

        let doc = rewriter(Some("https://pub.example.com")).rewrite(&source, &mapping).unwrap();
        let xml = render(&doc);

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains(
            r#"<enclosure url="https://pub.example.com/output/h_ep0.mp3" type="audio/mpeg" length="1234"/>"#
        ));
        assert!(xml.contains(
            r#"<enclosure url="https://up.example.com/ep1.mp3?x=1&amp;y=2" type="audio/mpeg"/>"#
        ));
        assert!(xml.contains("<pubDate>Tue, 02 Jan 2024 07:00:00 +0900</pubDate>"));
        assert!(xml.contains("News &amp; weather"));
        assert_eq!(doc.items(), 3);
        assert_eq!(doc.local_enclosures(), 1);
        assert_eq!(xml.matches("<enclosure").count(), 2);

        let positions: Vec<usize> = ["Episode 0", "Episode 1", "Episode 2"]
            .iter()
            .map(|title| xml.find(title).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_excluded_and_unparseable_dates() {
        let source = feed(vec![
            episode(0, Some("https://up.example.com/ep0.mp3"), Some("sometime")),
            episode(1, Some("https://up.example.com/ep1.mp3"), None),
        ]);
        let mut mapping = FeedMapping::new();
        mapping.exclude(1);

        let doc = rewriter(None).rewrite(&source, &mapping).unwrap();
        let xml = render(&doc);

        assert_eq!(doc.items(), 1);
        assert!(xml.contains("<pubDate>sometime</pubDate>"));
        assert!(!xml.contains("Episode 1"));
    }

    #[test]
    fn test_channel_overrides() {
        let overrides = ChannelConfig {
            title: Some("Normalized News".to_string()),
            itunes_image: Some("https://pub.example.com/cover.png".to_string()),
            itunes_category: Some("News".to_string()),
            itunes_explicit: Some(false),
            ..Default::default()
        };
        let doc = FeedRewriter::new(overrides, PublicLocator::new(None, "."), jst())
            .rewrite(&feed(vec![]), &FeedMapping::new())
            .unwrap();
        let xml = render(&doc);

        assert!(xml.contains("<title>Normalized News</title>"));
        assert!(xml.contains("<description>Upstream description</description>"));
        assert!(xml.contains(r#"<itunes:image href="https://pub.example.com/cover.png"/>"#));
        assert!(xml.contains(r#"<itunes:category text="News"/>"#));
        assert!(xml.contains("<itunes:explicit>no</itunes:explicit>"));
    }

    #[test]
    fn test_output_parses_back() {
        let source = feed(vec![episode(0, Some("https://up.example.com/ep0.mp3"), None)]);
        let doc = rewriter(None).rewrite(&source, &FeedMapping::new()).unwrap();

        let reparsed = parse_feed(doc.as_bytes(), "mp3").unwrap();
        assert_eq!(reparsed.episodes.len(), 1);
        assert_eq!(
            reparsed.episodes[0].source_audio_url.as_deref(),
            Some("https://up.example.com/ep0.mp3")
        );
        assert_eq!(reparsed.channel.title, "Upstream");
    }

    #[test]
    fn test_rewrite_is_deterministic() {
        let source = feed(vec![
            episode(0, Some("https://up.example.com/ep0.mp3"), Some("2024-01-02T07:00:00")),
            episode(1, None, None),
        ]);
        let r = rewriter(Some("https://pub.example.com"));
        let a = r.rewrite(&source, &FeedMapping::new()).unwrap();
        let b = r.rewrite(&source, &FeedMapping::new()).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[tokio::test]
    async fn test_write_to_replaces_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("feed.xml");
        let doc = rewriter(None).rewrite(&feed(vec![]), &FeedMapping::new()).unwrap();

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"stale").unwrap();
        doc.write_to(&path).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), doc.as_bytes());
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_written_feed_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.xml");
        let doc = rewriter(None).rewrite(&feed(vec![]), &FeedMapping::new()).unwrap();
        doc.write_to(&path).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o644, 0o644);
    }
}
