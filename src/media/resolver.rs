use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use super::{
    DnsResolver, MediaError, MediaKind, MediaPayload, MediaUnavailable, ResolvedMedia, guard,
};
use crate::archive::{ArchiveApi, SearchResult};
use crate::config::MediaSettings;

const MANIFEST_MIME: &str = "application/ld+json";
const PRIORITY: [MediaKind; 3] = [
    MediaKind::Thumbnail,
    MediaKind::IiifManifest,
    MediaKind::Stream,
];

/// A search result paired with whatever media could be resolved for it.
#[derive(Debug, Clone)]
pub struct ResolvedItem {
    pub result: SearchResult,
    pub media: Option<ResolvedMedia>,
    pub warning: Option<MediaUnavailable>,
}

pub struct MediaResolver<'a, A> {
    api: &'a A,
    settings: &'a MediaSettings,
}

impl<'a, A: ArchiveApi + DnsResolver> MediaResolver<'a, A> {
    pub fn new(api: &'a A, settings: &'a MediaSettings) -> Self {
        Self { api, settings }
    }

    /// Picks the best available media for one record.
    ///
    /// Thumbnails are downloaded only when inlining; manifests and streams
    /// are always returned as locators. An unusable thumbnail falls through
    /// to the next kind. `Ok(None)` means the record has no media at all.
    pub async fn resolve(
        &self,
        record: &SearchResult,
    ) -> Result<Option<ResolvedMedia>, MediaUnavailable> {
        let mut unavailable = None;
        for kind in PRIORITY {
            let Some(media_ref) = record.first_ref(kind) else {
                continue;
            };
            let resolved = match kind {
                MediaKind::Thumbnail => match self.thumbnail(&media_ref.locator).await {
                    Ok(media) => media,
                    Err(e) => {
                        warn!(record_id = %record.record_id, error = %e, "thumbnail unavailable");
                        unavailable = Some(MediaUnavailable {
                            record_id: record.record_id.clone(),
                            kind: MediaKind::Thumbnail,
                            reason: e.to_string(),
                        });
                        continue;
                    }
                },
                MediaKind::IiifManifest => ResolvedMedia {
                    kind: MediaKind::IiifManifest,
                    payload: MediaPayload::Url(media_ref.locator.clone()),
                    mime_type: MANIFEST_MIME.to_string(),
                },
                MediaKind::Stream => ResolvedMedia {
                    kind: MediaKind::Stream,
                    payload: MediaPayload::Url(media_ref.locator.clone()),
                    mime_type: media_ref
                        .format
                        .map_or("application/octet-stream", |f| f.mime_type())
                        .to_string(),
                },
            };
            return Ok(Some(resolved));
        }
        unavailable.map_or(Ok(None), Err)
    }

    async fn thumbnail(&self, locator: &str) -> Result<ResolvedMedia, MediaError> {
        let url =
            guard::check_media_url(locator, self.settings.allow_private_hosts, self.api).await?;
        if !self.settings.inline_thumbnails {
            return Ok(ResolvedMedia {
                kind: MediaKind::Thumbnail,
                payload: MediaPayload::Url(locator.to_string()),
                mime_type: image_mime_from_path(url.path()).to_string(),
            });
        }

        let image = self.api.fetch_image(locator).await?;
        debug!(url = locator, bytes = image.bytes.len(), "thumbnail fetched");
        Ok(ResolvedMedia {
            kind: MediaKind::Thumbnail,
            payload: MediaPayload::Inline(image.bytes),
            mime_type: image.mime_type,
        })
    }

    /// Resolves a page with bounded concurrency, keeping search order.
    pub async fn resolve_page(&self, results: Vec<SearchResult>) -> Vec<ResolvedItem> {
        stream::iter(results)
            .map(|result| async move {
                let (media, warning) = match self.resolve(&result).await {
                    Ok(media) => (media, None),
                    Err(unavailable) => (None, Some(unavailable)),
                };
                ResolvedItem {
                    result,
                    media,
                    warning,
                }
            })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await
    }
}

/// Best guess from the file extension; archive thumbnails are mostly JPEG.
fn image_mime_from_path(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockArchive, record_with};
    use serde_json::json;

    fn settings() -> MediaSettings {
        MediaSettings {
            concurrency: 2,
            inline_thumbnails: false,
            allow_private_hosts: false,
        }
    }

    fn result(value: serde_json::Value, api: &MockArchive) -> SearchResult {
        SearchResult::from_raw(record_with(value), |id| api.manifest_url(id)).unwrap()
    }

    fn thumbnail_only(value: serde_json::Value, api: &MockArchive) -> SearchResult {
        let mut record = result(value, api);
        record.media_refs.retain(|r| r.kind == MediaKind::Thumbnail);
        record
    }

    #[tokio::test]
    async fn thumbnail_is_referenced_without_download() {
        let api = MockArchive::default();
        let settings = settings();
        let resolver = MediaResolver::new(&api, &settings);
        let record = result(
            json!({"recordid": "1", "thumbnail": "https://img.example/1.jpg"}),
            &api,
        );

        let media = resolver.resolve(&record).await.unwrap().unwrap();
        assert_eq!(media.kind, MediaKind::Thumbnail);
        assert_eq!(media.mime_type, "image/jpeg");
        assert_eq!(
            media.payload,
            MediaPayload::Url("https://img.example/1.jpg".into())
        );
        assert_eq!(api.image_calls(), 0);

        let png = result(
            json!({"recordid": "1b", "thumbnail": "https://img.example/1b.PNG"}),
            &api,
        );
        let media = resolver.resolve(&png).await.unwrap().unwrap();
        assert_eq!(media.mime_type, "image/png");
    }

    #[tokio::test]
    async fn inline_thumbnails_carry_bytes() {
        let api = MockArchive::default();
        let settings = MediaSettings {
            inline_thumbnails: true,
            ..settings()
        };
        let resolver = MediaResolver::new(&api, &settings);
        let record = result(
            json!({"recordid": "1", "thumbnail": "https://img.example/1.jpg"}),
            &api,
        );

        let media = resolver.resolve(&record).await.unwrap().unwrap();
        assert!(matches!(media.payload, MediaPayload::Inline(ref b) if !b.is_empty()));
        assert_eq!(api.image_calls(), 1);
    }

    #[tokio::test]
    async fn manifest_is_returned_by_reference_without_fetching() {
        let api = MockArchive::default();
        let settings = settings();
        let resolver = MediaResolver::new(&api, &settings);
        let record = result(json!({"recordid": "2"}), &api);

        let media = resolver.resolve(&record).await.unwrap().unwrap();
        assert_eq!(media.kind, MediaKind::IiifManifest);
        assert_eq!(
            media.payload,
            MediaPayload::Url(api.manifest_url("2"))
        );
        assert_eq!(api.manifest_calls(), 0);
        assert_eq!(api.image_calls(), 0);
    }

    #[tokio::test]
    async fn stream_locator_is_returned_without_download() {
        let api = MockArchive::default();
        let settings = settings();
        let resolver = MediaResolver::new(&api, &settings);
        let record = result(
            json!({"recordid": "3", "stream_url_mp4": "https://media.example/3.mp4"}),
            &api,
        );

        let media = resolver.resolve(&record).await.unwrap().unwrap();
        assert_eq!(media.kind, MediaKind::Stream);
        assert_eq!(media.mime_type, "video/mp4");
        assert_eq!(api.image_calls(), 0);
    }

    #[tokio::test]
    async fn record_without_media_resolves_to_none() {
        let api = MockArchive::default();
        let settings = settings();
        let resolver = MediaResolver::new(&api, &settings);
        let mut record = result(json!({"recordid": "4"}), &api);
        record.media_refs.clear();

        assert!(resolver.resolve(&record).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn private_thumbnail_host_falls_back_to_manifest() {
        let api = MockArchive::default();
        let settings = settings();
        let resolver = MediaResolver::new(&api, &settings);
        let record = result(
            json!({"recordid": "5", "thumbnail": "http://127.0.0.1/secret.jpg"}),
            &api,
        );

        let media = resolver.resolve(&record).await.unwrap().unwrap();
        assert_eq!(media.kind, MediaKind::IiifManifest);
        assert_eq!(media.payload, MediaPayload::Url(api.manifest_url("5")));
        assert_eq!(api.image_calls(), 0);
    }

    #[tokio::test]
    async fn private_thumbnail_without_other_media_is_a_warning() {
        let api = MockArchive::default();
        let settings = settings();
        let resolver = MediaResolver::new(&api, &settings);
        let record = thumbnail_only(
            json!({"recordid": "5", "thumbnail": "http://127.0.0.1/secret.jpg"}),
            &api,
        );

        let warning = resolver.resolve(&record).await.unwrap_err();
        assert_eq!(warning.record_id, "5");
        assert_eq!(warning.kind, MediaKind::Thumbnail);
        assert!(warning.reason.contains("private"));
        assert_eq!(api.image_calls(), 0);
    }

    #[tokio::test]
    async fn thumbnail_name_resolving_to_private_ip_is_skipped() {
        let api = MockArchive::default().resolving_to("10.1.2.3".parse().unwrap());
        let settings = settings();
        let resolver = MediaResolver::new(&api, &settings);
        let record = thumbnail_only(
            json!({"recordid": "6", "thumbnail": "https://thumbs.example/6.jpg"}),
            &api,
        );

        let warning = resolver.resolve(&record).await.unwrap_err();
        assert!(warning.reason.contains("private"));
        assert_eq!(api.image_calls(), 0);
    }

    #[tokio::test]
    async fn one_failing_thumbnail_does_not_affect_the_page() {
        let api = MockArchive::default().failing_image("https://img.example/2.jpg");
        let settings = MediaSettings {
            inline_thumbnails: true,
            ..settings()
        };
        let resolver = MediaResolver::new(&api, &settings);
        let page: Vec<_> = (1..=4)
            .map(|i| {
                let thumbnail = format!("https://img.example/{i}.jpg");
                thumbnail_only(
                    json!({"recordid": i.to_string(), "thumbnail": thumbnail}),
                    &api,
                )
            })
            .collect();

        let items = resolver.resolve_page(page).await;
        assert_eq!(items.len(), 4);
        let ids: Vec<_> = items.iter().map(|i| i.result.record_id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3", "4"]);

        assert!(items[1].media.is_none());
        assert_eq!(items[1].warning.as_ref().unwrap().record_id, "2");
        for i in [0, 2, 3] {
            assert_eq!(items[i].media.as_ref().unwrap().kind, MediaKind::Thumbnail);
            assert!(items[i].warning.is_none());
        }
    }

    #[tokio::test]
    async fn failed_thumbnail_download_falls_back_to_manifest() {
        let api = MockArchive::default().failing_image("https://img.example/7.jpg");
        let settings = MediaSettings {
            inline_thumbnails: true,
            ..settings()
        };
        let resolver = MediaResolver::new(&api, &settings);
        let record = result(
            json!({"recordid": "7", "thumbnail": "https://img.example/7.jpg"}),
            &api,
        );

        let media = resolver.resolve(&record).await.unwrap().unwrap();
        assert_eq!(media.kind, MediaKind::IiifManifest);
        assert_eq!(api.image_calls(), 1);
    }
}
