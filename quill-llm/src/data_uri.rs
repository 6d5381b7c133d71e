//! `data:` URIs, the portable way to inline images and files.

/// The pieces of a base64 `data:` URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUri<'a> {
    pub media_type: &'a str,
    /// Base64 payload, not decoded.
    pub data: &'a str,
}

/// Split `data:<media type>;base64,<data>`. Other URIs give `None`.
pub fn parse(uri: &str) -> Option<DataUri<'_>> {
    let rest = uri.strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let media_type = header.strip_suffix(";base64")?;
    if media_type.is_empty() {
        return None;
    }
    Some(DataUri { media_type, data })
}

pub fn format(media_type: &str, data: &str) -> String {
    format!("data:{};base64,{}", media_type, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_base64_uri() {
        let uri = parse("data:image/png;base64,iVBORw0KGgo=").expect("data uri");
        assert_eq!(uri.media_type, "image/png");
        assert_eq!(uri.data, "iVBORw0KGgo=");
        assert_eq!(format(uri.media_type, uri.data), "data:image/png;base64,iVBORw0KGgo=");
    }

    #[test]
    fn test_non_base64_and_urls_are_rejected() {
        assert_eq!(parse("https://example.com/a.png"), None);
        assert_eq!(parse("data:text/plain,hello"), None);
        assert_eq!(parse("data:;base64,abc"), None);
    }
}
