/// A link attached to a feed entry, with its declared media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedLink {
    pub href: String,
    pub media_type: String,
}

impl TypedLink {
    pub fn new(href: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            media_type: media_type.into(),
        }
    }

    /// Audio media type and a path ending in `.{extension}`
    pub fn is_audio(&self, extension: &str) -> bool {
        if !self.media_type.to_ascii_lowercase().contains("audio") {
            return false;
        }
        let suffix = format!(".{}", extension.trim_start_matches('.').to_ascii_lowercase());
        url_path(&self.href).to_ascii_lowercase().ends_with(&suffix)
    }
}

/// Entry guid, kept so podcast clients keep recognizing episodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeGuid {
    pub value: String,
    pub permalink: bool,
}

/// One feed entry
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    /// Position in the source feed; identifies the episode within a run
    pub index: usize,
    pub title: String,
    pub description: String,
    pub link: Option<String>,
    pub guid: Option<EpisodeGuid>,

    /// Publication timestamp exactly as the source feed wrote it
    pub published_at: Option<String>,

    pub links: Vec<TypedLink>,

    /// The first audio link, if any
    pub source_audio_url: Option<String>,
}

impl Episode {
    /// Short human-readable identity for log lines
    pub fn label(&self) -> String {
        if self.title.is_empty() {
            format!("#{}", self.index + 1)
        } else {
            format!("#{} \"{}\"", self.index + 1, self.title)
        }
    }
}

/// Channel-level values of the source feed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelInfo {
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: Option<String>,
    pub itunes_image: Option<String>,
    pub itunes_category: Option<String>,
    pub itunes_explicit: Option<String>,
}

/// A parsed upstream feed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceFeed {
    pub channel: ChannelInfo,
    pub episodes: Vec<Episode>,
}

impl SourceFeed {
    /// Number of episodes that carry an audio link
    pub fn audio_count(&self) -> usize {
        self.episodes.iter().filter(|e| e.source_audio_url.is_some()).count()
    }
}

/// Path portion of a URL, without query or fragment
fn url_path(href: &str) -> String {
    match reqwest::Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => href.split(['?', '#']).next().unwrap_or_default().to_string(),
    }
}

/// Last path segment of a URL, usable as a local filename
pub fn file_name_from_url(href: &str) -> Option<String> {
    let path = url_path(href);
    let name = path.rsplit('/').next()?.trim();

    if name.is_empty() || name == "." || name == ".." || name.contains('\\') {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_link_detection() {
        let link = TypedLink::new("https://cdn.example.com/a/ep1.mp3", "audio/mpeg");
        assert!(link.is_audio("mp3"));
        assert!(link.is_audio(".MP3"));
        assert!(!link.is_audio("m4a"));

        let html = TypedLink::new("https://example.com/ep1.mp3", "text/html");
        assert!(!html.is_audio("mp3"));
    }

    #[test]
    fn test_audio_link_ignores_query() {
        let link = TypedLink::new("https://cdn.example.com/ep1.MP3?token=abc", "audio/mpeg");
        assert!(link.is_audio("mp3"));

        let wrong = TypedLink::new("https://cdn.example.com/play?file=ep1.mp3", "audio/mpeg");
        assert!(!wrong.is_audio("mp3"));
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://cdn.example.com/podcast/ep1.mp3?x=1"),
            Some("ep1.mp3".to_string())
        );
        assert_eq!(file_name_from_url("https://cdn.example.com/podcast/"), None);
        assert_eq!(file_name_from_url("relative/path/ep2.mp3#t=10"), Some("ep2.mp3".to_string()));
    }

    #[test]
    fn test_episode_label() {
        let episode = Episode {
            index: 0,
            title: "Morning".to_string(),
            description: String::new(),
            link: None,
            guid: None,
            published_at: None,
            links: vec![],
            source_audio_url: None,
        };
        assert_eq!(episode.label(), "#1 \"Morning\"");
    }
}
