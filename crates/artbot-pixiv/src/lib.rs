//! Pixiv adapter.
//!
//! Reads artwork through the public web ajax endpoints, no login required.
//! R-18 works come back with their metadata but are flagged NSFW.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use artbot_core::{
    artwork::{Artwork, ArtworkPage, ArtworkProvider},
    errors::Error,
    Result,
};

pub const DEFAULT_BASE_URL: &str = "https://www.pixiv.net";

const LINK_PATTERN: &str = r"(?i)https?://(?:www\.)?pixiv\.net/(?:en/)?(?:artworks/|member_illust\.php\?)(?:mode=medium&)?(?:illust_id=)?([0-9]+)";

#[derive(Clone, Debug)]
pub struct PixivClient {
    base_url: String,
    http: reqwest::Client,
    links: Regex,
}

impl PixivClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (compatible; artbot)")
            .build()
            .map_err(|e| Error::External(format!("pixiv client build error: {e}")))?;
        let links = Regex::new(LINK_PATTERN)
            .map_err(|e| Error::Config(format!("pixiv link pattern: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            links,
        })
    }

    async fn get<T: DeserializeOwned>(&self, id: &str, path: &str) -> Result<T> {
        let url = format!("{}/ajax/illust/{id}{path}", self.base_url);
        debug!(%url, "pixiv request");
        let resp = self
            .http
            .get(&url)
            .header(reqwest::header::REFERER, "https://www.pixiv.net/")
            .send()
            .await
            .map_err(|e| Error::External(format!("pixiv request error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(status, id));
        }

        let envelope: Envelope = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("pixiv json error: {e}")))?;
        envelope.into_body(id)
    }
}

#[async_trait]
impl ArtworkProvider for PixivClient {
    fn name(&self) -> &'static str {
        "pixiv"
    }

    fn match_links(&self, text: &str) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for caps in self.links.captures_iter(text) {
            let id = caps[1].to_string();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    async fn find(&self, id: &str) -> Result<Artwork> {
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Validation(format!("{id:?} is not a pixiv artwork id")));
        }

        let illust: Illust = self.get(id, "").await?;
        let pages = if illust.page_count > 1 {
            self.get::<Vec<PageEntry>>(id, "/pages").await?
        } else {
            Vec::new()
        };
        Ok(illust.into_artwork(id, pages))
    }
}

fn status_error(status: StatusCode, id: &str) -> Error {
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(format!("pixiv artwork {id}")),
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited("pixiv".to_string()),
        other => Error::External(format!("pixiv returned {other} for artwork {id}")),
    }
}

/// Every ajax response wraps its payload. Failed lookups carry `error: true` and an empty body.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    body: serde_json::Value,
}

impl Envelope {
    fn into_body<T: DeserializeOwned>(self, id: &str) -> Result<T> {
        if self.error || self.body.is_null() {
            return Err(if self.message.is_empty() {
                Error::NotFound(format!("pixiv artwork {id}"))
            } else {
                Error::NotFound(format!("pixiv artwork {id}: {}", self.message))
            });
        }
        serde_json::from_value(self.body)
            .map_err(|e| Error::External(format!("unexpected pixiv payload: {e}")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Illust {
    illust_title: String,
    user_name: String,
    #[serde(default)]
    bookmark_count: u64,
    #[serde(default)]
    x_restrict: u8,
    #[serde(default)]
    page_count: usize,
    #[serde(default)]
    tags: TagList,
    urls: Urls,
}

#[derive(Debug, Default, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    tag: String,
}

#[derive(Debug, Deserialize)]
struct Urls {
    regular: Option<String>,
    original: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageEntry {
    urls: Urls,
}

impl Illust {
    fn into_artwork(self, id: &str, pages: Vec<PageEntry>) -> Artwork {
        let tags: Vec<String> = self.tags.tags.into_iter().map(|t| t.tag).collect();
        let nsfw = self.x_restrict > 0 || tags.iter().any(|t| t == "R-18" || t == "R-18G");

        let pages = if pages.is_empty() {
            page_from(self.urls).into_iter().collect()
        } else {
            pages.into_iter().filter_map(|p| page_from(p.urls)).collect()
        };

        Artwork {
            id: id.to_string(),
            url: format!("https://www.pixiv.net/en/artworks/{id}"),
            title: self.illust_title,
            author: if self.user_name.is_empty() {
                "Unknown".to_string()
            } else {
                self.user_name
            },
            pages,
            tags,
            likes: self.bookmark_count,
            nsfw,
        }
    }
}

fn page_from(urls: Urls) -> Option<ArtworkPage> {
    let original = urls.original?;
    Some(ArtworkPage {
        preview: urls.regular.unwrap_or_else(|| original.clone()),
        original,
    })
}

#[cfg(test)]
mod tests {
    use tokio::{io::AsyncWriteExt, net::TcpListener};

    use super::*;

    const ILLUST: &str = r#"{
        "error": false,
        "message": "",
        "body": {
            "illustId": "123",
            "illustTitle": "Sunset",
            "userName": "painter",
            "bookmarkCount": 321,
            "xRestrict": 0,
            "pageCount": 1,
            "tags": {"tags": [{"tag": "landscape"}, {"tag": "R-18"}]},
            "urls": {
                "regular": "https://i.pximg.net/img-master/123_p0_master1200.jpg",
                "original": "https://i.pximg.net/img-original/123_p0.png"
            }
        }
    }"#;

    const PAGES: &str = r#"{
        "error": false,
        "body": [
            {"urls": {"regular": "https://i/p0_master.jpg", "original": "https://i/p0.png"}},
            {"urls": {"regular": "https://i/p1_master.jpg", "original": "https://i/p1.png"}}
        ]
    }"#;

    fn client() -> PixivClient {
        PixivClient::new(DEFAULT_BASE_URL).unwrap()
    }

    #[test]
    fn matches_artwork_and_legacy_links() {
        let text = "look https://www.pixiv.net/en/artworks/123 and \
                    http://pixiv.net/member_illust.php?mode=medium&illust_id=456 \
                    plus https://www.pixiv.net/artworks/123 again";
        assert_eq!(client().match_links(text), vec!["123", "456"]);
        assert!(client().match_links("https://example.com/artworks/1").is_empty());
    }

    #[test]
    fn single_page_illust_uses_its_own_urls() {
        let env: Envelope = serde_json::from_str(ILLUST).unwrap();
        let art = env
            .into_body::<Illust>("123")
            .unwrap()
            .into_artwork("123", Vec::new());

        assert_eq!(art.title, "Sunset");
        assert_eq!(art.author, "painter");
        assert_eq!(art.likes, 321);
        assert!(art.nsfw);
        assert_eq!(art.tags, vec!["landscape", "R-18"]);
        assert_eq!(art.pages.len(), 1);
        assert_eq!(art.pages[0].original, "https://i.pximg.net/img-original/123_p0.png");
        assert_eq!(art.url, "https://www.pixiv.net/en/artworks/123");
    }

    #[test]
    fn multi_page_illust_uses_page_list() {
        let env: Envelope = serde_json::from_str(ILLUST).unwrap();
        let pages: Envelope = serde_json::from_str(PAGES).unwrap();
        let art = env
            .into_body::<Illust>("123")
            .unwrap()
            .into_artwork("123", pages.into_body("123").unwrap());
        let previews: Vec<&str> = art.pages.iter().map(|p| p.preview.as_str()).collect();
        assert_eq!(previews, vec!["https://i/p0_master.jpg", "https://i/p1_master.jpg"]);
    }

    #[test]
    fn x_restrict_marks_nsfw_without_tag() {
        let json = ILLUST.replace(r#"{"tag": "R-18"}"#, r#"{"tag": "sky"}"#).replace(
            r#""xRestrict": 0"#,
            r#""xRestrict": 1"#,
        );
        let env: Envelope = serde_json::from_str(&json).unwrap();
        let illust: Illust = env.into_body("123").unwrap();
        assert!(illust.into_artwork("123", vec![]).nsfw);
    }

    #[test]
    fn error_envelope_is_not_found() {
        let env: Envelope =
            serde_json::from_str(r#"{"error": true, "message": "deleted", "body": []}"#).unwrap();
        assert!(matches!(env.into_body::<Illust>("9"), Err(Error::NotFound(_))));
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert!(matches!(status_error(StatusCode::NOT_FOUND, "1"), Error::NotFound(_)));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "1"),
            Error::RateLimited(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "1"),
            Error::External(_)
        ));
    }

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let resp = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = sock.write_all(resp.as_bytes()).await;
            let _ = sock.shutdown().await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn find_fetches_and_maps_http_errors() {
        let base = serve_once("200 OK", ILLUST).await;
        let art = PixivClient::new(base).unwrap().find("123").await.unwrap();
        assert_eq!(art.pages.len(), 1);

        let base = serve_once("404 Not Found", "{}").await;
        let err = PixivClient::new(base).unwrap().find("123").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let base = serve_once("429 Too Many Requests", "{}").await;
        let err = PixivClient::new(base).unwrap().find("123").await.unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));
    }

    #[tokio::test]
    async fn non_numeric_id_is_rejected_without_request() {
        let err = client().find("abc").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
