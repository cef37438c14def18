use rss::Channel;
use tracing::debug;

use crate::error::{FeedError, Result};
use crate::feed::types::{ChannelInfo, Episode, EpisodeGuid, SourceFeed, TypedLink};

/// Parse an RSS 2.0 document into episodes in feed order.
///
/// Each episode's audio link is the first enclosure whose media type
/// mentions audio and whose URL path ends in `.{audio_extension}`.
pub fn parse_feed(bytes: &[u8], audio_extension: &str) -> Result<SourceFeed> {
    let channel = Channel::read_from(bytes).map_err(|e| FeedError::Parse {
        reason: e.to_string(),
    })?;

    let episodes: Vec<Episode> = channel
        .items()
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let links: Vec<TypedLink> = item
                .enclosure()
                .map(|enclosure| TypedLink::new(enclosure.url(), enclosure.mime_type()))
                .into_iter()
                .collect();

            let source_audio_url = links
                .iter()
                .find(|link| link.is_audio(audio_extension))
                .map(|link| link.href.clone());

            Episode {
                index,
                title: item.title().unwrap_or_default().trim().to_string(),
                description: item.description().unwrap_or_default().to_string(),
                link: non_empty(item.link()),
                guid: item.guid().map(|guid| EpisodeGuid {
                    value: guid.value().to_string(),
                    permalink: guid.is_permalink(),
                }),
                published_at: non_empty(item.pub_date()),
                links,
                source_audio_url,
            }
        })
        .collect();

    let channel_info = channel_info(&channel);
    let feed = SourceFeed {
        channel: channel_info,
        episodes,
    };

    debug!(
        "Parsed feed \"{}\": {} entries, {} with audio",
        feed.channel.title,
        feed.episodes.len(),
        feed.audio_count()
    );
    Ok(feed)
}

fn channel_info(channel: &Channel) -> ChannelInfo {
    let itunes = channel.itunes_ext();

    ChannelInfo {
        title: channel.title().trim().to_string(),
        link: channel.link().to_string(),
        description: channel.description().to_string(),
        language: non_empty(channel.language()),
        itunes_image: itunes
            .and_then(|ext| non_empty(ext.image()))
            .or_else(|| channel.image().map(|image| image.url().to_string())),
        itunes_category: itunes
            .and_then(|ext| ext.categories().first())
            .map(|category| category.text().to_string()),
        itunes_explicit: itunes.and_then(|ext| non_empty(ext.explicit())),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
