//! Content id extraction
//!
//! Participants paste whatever they have: a share link, a watch URL, an
//! embed URL or a bare id. Everything is normalized to a single content id.
//! Input that cannot be understood is used verbatim.

use url::Url;

/// Hosts whose first path segment is the content id
const SHORT_LINK_HOSTS: &[&str] = &["youtu.be"];

/// Query parameter carrying the id on watch pages
const ID_QUERY_PARAM: &str = "v";

/// Path segment preceding the id on embed URLs
const EMBED_SEGMENT: &str = "embed";

/// Extract a content id from a URL or pass the input through unchanged
pub fn extract_content_id(input: &str) -> String {
    let Ok(url) = Url::parse(input) else {
        return input.to_string();
    };

    if url.host_str().is_some_and(is_short_link_host) {
        if let Some(id) = url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|segment| !segment.is_empty())
        {
            return id.to_string();
        }
    }

    if let Some((_, id)) = url
        .query_pairs()
        .find(|(key, value)| key == ID_QUERY_PARAM && !value.is_empty())
    {
        return id.into_owned();
    }

    if let Some(id) = embed_id(&url) {
        return id.to_string();
    }

    input.to_string()
}

fn is_short_link_host(host: &str) -> bool {
    SHORT_LINK_HOSTS
        .iter()
        .any(|short| host == *short || host.ends_with(&format!(".{}", short)))
}

/// Find `/embed/<id>` anywhere in the path
fn embed_id(url: &Url) -> Option<&str> {
    let mut segments = url.path_segments()?;
    segments.find(|segment| *segment == EMBED_SEGMENT)?;
    segments.next().filter(|id| !id.is_empty())
}
