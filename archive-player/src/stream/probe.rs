//! Manifest-probing engine for headless runs.
//!
//! It does not download media. Loading a source fetches the HLS playlist, follows the first
//! variant of a master playlist, and reports the first fragment URI as a parsed manifest.

use reqwest::{Client, Url};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::engine::{
    EngineConfig, EngineErrorKind, EngineEvent, EngineEventSender, EngineFactory, EngineId,
    StreamingEngine,
};

const PLAYLIST_HEADER: &str = "#EXTM3U";
const VARIANT_TAG: &str = "#EXT-X-STREAM-INF";

/// First URI line of a playlist
pub fn first_uri(playlist: &str) -> Option<&str> {
    playlist
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
}

pub fn is_master_playlist(playlist: &str) -> bool {
    playlist.lines().any(|line| line.trim_start().starts_with(VARIANT_TAG))
}

#[derive(Debug)]
struct ProbeError {
    kind: EngineErrorKind,
    details: String,
}

impl ProbeError {
    fn network(details: impl ToString) -> Self {
        Self {
            kind: EngineErrorKind::Network,
            details: details.to_string(),
        }
    }

    fn media(details: impl ToString) -> Self {
        Self {
            kind: EngineErrorKind::Media,
            details: details.to_string(),
        }
    }
}

async fn fetch_playlist(client: &Client, url: &Url) -> Result<String, ProbeError> {
    let response = client.get(url.clone()).send().await.map_err(ProbeError::network)?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProbeError::network(format!("HTTP {} for {}", status.as_u16(), url)));
    }
    let body = response.text().await.map_err(ProbeError::network)?;
    if !body.trim_start().starts_with(PLAYLIST_HEADER) {
        return Err(ProbeError::media(format!("{} is not an HLS playlist", url)));
    }
    Ok(body)
}

/// Relative URI of the first media fragment behind `url`.
async fn probe(client: &Client, url: &str) -> Result<Option<String>, ProbeError> {
    let url = Url::parse(url).map_err(|e| ProbeError::network(format!("bad url {}: {}", url, e)))?;
    let mut playlist = fetch_playlist(client, &url).await?;

    if is_master_playlist(&playlist) {
        let variant = first_uri(&playlist)
            .ok_or_else(|| ProbeError::media("master playlist without variants"))?;
        let variant_url = url.join(variant).map_err(ProbeError::media)?;
        debug!(variant = %variant_url, "Following first variant");
        playlist = fetch_playlist(client, &variant_url).await?;
    }

    Ok(first_uri(&playlist).map(str::to_string))
}

pub struct ProbeEngine {
    id: EngineId,
    config: EngineConfig,
    client: Client,
    events: EngineEventSender,
    cancel: CancellationToken,
    attached: bool,
}

impl ProbeEngine {
    pub fn new(id: EngineId, config: EngineConfig, client: Client, events: EngineEventSender) -> Self {
        Self {
            id,
            config,
            client,
            events,
            cancel: CancellationToken::new(),
            attached: false,
        }
    }

    fn emit(&self, event: EngineEvent) {
        if self.events.send((self.id, event)).is_err() {
            debug!(engine_id = self.id, "Event receiver closed");
        }
    }
}

impl StreamingEngine for ProbeEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    fn attach_media(&mut self) {
        self.attached = true;
        self.emit(EngineEvent::MediaAttached);
    }

    fn load_source(&mut self, url: &str) {
        let id = self.id;
        let client = self.client.clone();
        let events = self.events.clone();
        let cancel = self.cancel.child_token();
        let url = url.to_string();

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = probe(&client, &url) => result,
            };

            let event = match result {
                Ok(first_fragment) => EngineEvent::ManifestParsed { first_fragment },
                Err(e) => {
                    warn!(engine_id = id, kind = ?e.kind, details = %e.details, "Probe failed");
                    EngineEvent::Error {
                        fatal: true,
                        kind: e.kind,
                        details: e.details,
                    }
                }
            };
            let _ = events.send((id, event));
        });
    }

    fn start_position(&self) -> Option<f64> {
        self.config.start_position
    }

    fn set_start_position(&mut self, seconds: f64) {
        self.config.start_position = Some(seconds);
    }

    fn recover_media_error(&mut self) {
        debug!(engine_id = self.id, "Media recovery requested");
    }

    fn stop_load(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
    }

    fn destroy(&mut self) {
        self.cancel.cancel();
        if self.attached {
            self.attached = false;
            self.emit(EngineEvent::MediaDetached);
        }
    }
}

pub struct ProbeEngineFactory {
    client: Client,
    events: EngineEventSender,
}

impl ProbeEngineFactory {
    pub fn new(client: Client, events: EngineEventSender) -> Self {
        Self { client, events }
    }
}

impl EngineFactory for ProbeEngineFactory {
    fn is_supported(&self) -> bool {
        true
    }

    fn create(&mut self, id: EngineId, config: EngineConfig) -> Box<dyn StreamingEngine> {
        Box::new(ProbeEngine::new(id, config, self.client.clone(), self.events.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    const MEDIA: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXTINF:4.0,\nsegment-1705312800-1200.ts?token=a\n#EXTINF:4.0,\nsegment-1705312804-1204.ts?token=a\n";
    const MASTER: &str = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nlow/stream.m3u8\n";

    #[test]
    fn test_first_uri_skips_tags() {
        assert_eq!(first_uri(MEDIA), Some("segment-1705312800-1200.ts?token=a"));
        assert_eq!(first_uri("#EXTM3U\n#EXT-X-ENDLIST\n"), None);
    }

    #[test]
    fn test_master_detection() {
        assert!(is_master_playlist(MASTER));
        assert!(!is_master_playlist(MEDIA));
    }

    #[tokio::test]
    async fn test_attach_emits_event_and_destroy_detaches() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = ProbeEngine::new(7, EngineConfig::default(), Client::new(), tx);

        engine.attach_media();
        assert_eq!(rx.recv().await, Some((7, EngineEvent::MediaAttached)));

        engine.destroy();
        assert_eq!(rx.recv().await, Some((7, EngineEvent::MediaDetached)));
    }

    #[tokio::test]
    async fn test_invalid_url_reports_fatal_network_error() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = ProbeEngine::new(3, EngineConfig::default(), Client::new(), tx);

        engine.load_source("not a url");
        match rx.recv().await {
            Some((3, EngineEvent::Error { fatal, kind, .. })) => {
                assert!(fatal);
                assert_eq!(kind, EngineErrorKind::Network);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
