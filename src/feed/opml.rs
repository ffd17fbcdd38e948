use std::path::Path;

use opml::{Body, Head, Outline, OPML};

use crate::error::{AppError, Result};
use crate::models::{Feed, NewFeed};

/// Parse an OPML file into feed candidates. Nested outlines (category
/// folders) are walked recursively and flattened.
pub fn parse_opml_file(path: &Path) -> Result<Vec<NewFeed>> {
    let content = std::fs::read_to_string(path)?;
    let opml = OPML::from_str(&content).map_err(|e| AppError::OpmlParse(e.to_string()))?;

    let mut feeds = Vec::new();
    collect_feeds(&opml.body.outlines, &mut feeds);
    Ok(feeds)
}

fn collect_feeds(outlines: &[Outline], feeds: &mut Vec<NewFeed>) {
    for outline in outlines {
        // An outline with an xmlUrl is a feed entry; anything else is a folder
        if let Some(xml_url) = &outline.xml_url {
            let title = if outline.text.is_empty() {
                "Untitled".to_string()
            } else {
                outline.text.clone()
            };
            feeds.push(NewFeed {
                title,
                url: xml_url.clone(),
                site_url: outline.html_url.clone(),
                description: outline.description.clone(),
            });
        }
        collect_feeds(&outline.outlines, feeds);
    }
}

/// Export feeds to an OPML file.
pub fn export_opml_file(path: &Path, feeds: &[Feed]) -> Result<()> {
    let outlines = feeds
        .iter()
        .map(|feed| Outline {
            text: feed.title.clone(),
            r#type: Some("rss".to_string()),
            xml_url: Some(feed.url.clone()),
            html_url: feed.site_url.clone(),
            description: feed.description.clone(),
            ..Outline::default()
        })
        .collect();

    let opml = OPML {
        head: Some(Head {
            title: Some("Feedkeeper Feeds".to_string()),
            ..Head::default()
        }),
        body: Body { outlines },
        ..OPML::default()
    };

    let xml = opml
        .to_string()
        .map_err(|e| AppError::OpmlParse(e.to_string()))?;
    std::fs::write(path, xml)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    const NESTED_OPML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<opml version="2.0">
  <head><title>Subscriptions</title></head>
  <body>
    <outline text="Tech">
      <outline text="Example Blog" type="rss"
               xmlUrl="https://example.com/feed.xml"
               htmlUrl="https://example.com"
               description="An example blog"/>
      <outline text="" type="rss" xmlUrl="https://untitled.example/feed.xml"/>
    </outline>
    <outline text="News Direct" type="rss" xmlUrl="https://news.example/rss"/>
  </body>
</opml>"#;

    #[test]
    fn nested_outlines_flatten_to_feed_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.opml");
        std::fs::write(&path, NESTED_OPML).unwrap();

        let feeds = parse_opml_file(&path).unwrap();
        assert_eq!(feeds.len(), 3);

        assert_eq!(feeds[0].title, "Example Blog");
        assert_eq!(feeds[0].url, "https://example.com/feed.xml");
        assert_eq!(feeds[0].site_url.as_deref(), Some("https://example.com"));
        assert_eq!(feeds[0].description.as_deref(), Some("An example blog"));

        assert_eq!(feeds[1].title, "Untitled");
        assert_eq!(feeds[2].url, "https://news.example/rss");
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.opml");
        std::fs::write(&path, "<opml><body>").unwrap();

        assert!(matches!(
            parse_opml_file(&path),
            Err(AppError::OpmlParse(_))
        ));
    }

    #[test]
    fn exported_file_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.opml");

        let feeds = vec![Feed {
            id: 1,
            title: "Example Blog".to_string(),
            url: "https://example.com/feed.xml".to_string(),
            site_url: Some("https://example.com".to_string()),
            description: None,
            last_fetched: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }];

        export_opml_file(&path, &feeds).unwrap();
        let parsed = parse_opml_file(&path).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].title, "Example Blog");
        assert_eq!(parsed[0].url, "https://example.com/feed.xml");
        assert_eq!(parsed[0].site_url.as_deref(), Some("https://example.com"));
    }
}
