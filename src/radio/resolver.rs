use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::error::{RadioError, Result};

/// Seam de red del resolver: permite inyectar un fetcher falso en tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaylistFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Fetcher de producción sobre reqwest, con timeout corto.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PlaylistFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Sonda de alcanzabilidad del stream (HEAD con timeout corto). Cualquier
/// fallo de red cuenta como inalcanzable.
#[async_trait]
pub trait StreamProber: Send + Sync {
    async fn probe(&self, url: &str) -> bool;
}

pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StreamProber for HttpProber {
    async fn probe(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(response) => {
                let ok = response.status().is_success();
                if !ok {
                    warn!("📡 Stream respondió {} en {}", response.status(), url);
                }
                ok
            }
            Err(e) => {
                warn!("📡 Sonda de stream falló para {}: {}", url, e);
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaylistKind {
    M3u,
    Pls,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    resolved_url: String,
    resolved_at: DateTime<Utc>,
}

/// Convierte una URL configurada en una URL directamente reproducible,
/// resolviendo la indirección de playlists `.m3u`/`.m3u8`/`.pls`.
///
/// Las resoluciones exitosas se cachean por la URL *sin resolver* durante
/// un TTL fijo, de modo que varias estaciones que comparten URL comparten
/// también el hit de caché.
pub struct UrlResolver {
    fetcher: Arc<dyn PlaylistFetcher>,
    cache: DashMap<String, CacheEntry>,
    ttl: ChronoDuration,
}

impl UrlResolver {
    pub fn new(fetcher: Arc<dyn PlaylistFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            cache: DashMap::new(),
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::hours(1)),
        }
    }

    pub async fn resolve(&self, url: &str) -> Result<String> {
        // Caché primero, descartando entradas caducadas antes de reusar
        if let Some(entry) = self.cache.get(url) {
            if Utc::now() - entry.resolved_at < self.ttl {
                return Ok(entry.resolved_url.clone());
            }
            drop(entry);
            self.cache.remove(url);
        }

        let Some(kind) = playlist_kind(url) else {
            // Sin indirección: la URL se devuelve tal cual, sin red
            return Ok(url.to_string());
        };

        let body = self.fetcher.fetch_text(url).await.map_err(|e| {
            warn!("❌ Error descargando playlist {}: {}", url, e);
            RadioError::StreamUnavailable {
                url: url.to_string(),
            }
        })?;

        // Una playlist sin ninguna entrada http es un fallo duro, nunca se
        // degrada silenciosamente a la URL original
        let resolved = parse_playlist(kind, &body).ok_or_else(|| RadioError::StreamUnavailable {
            url: url.to_string(),
        })?;

        info!("✅ Playlist resuelta: {} -> {}", url, resolved);
        self.cache.insert(
            url.to_string(),
            CacheEntry {
                resolved_url: resolved.clone(),
                resolved_at: Utc::now(),
            },
        );

        Ok(resolved)
    }

    pub fn invalidate(&self, url: &str) {
        self.cache.remove(url);
    }

    #[cfg(test)]
    fn backdate(&self, url: &str, age: ChronoDuration) {
        if let Some(mut entry) = self.cache.get_mut(url) {
            entry.resolved_at = Utc::now() - age;
        }
    }
}

/// Detecta la indirección por la extensión del path, sin mirar la query.
fn playlist_kind(url: &str) -> Option<PlaylistKind> {
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());

    if path.ends_with(".pls") {
        Some(PlaylistKind::Pls)
    } else if path.ends_with(".m3u") || path.ends_with(".m3u8") {
        Some(PlaylistKind::M3u)
    } else {
        None
    }
}

fn parse_playlist(kind: PlaylistKind, body: &str) -> Option<String> {
    match kind {
        PlaylistKind::Pls => {
            // Primera entrada File<n>=<valor> cuyo valor sea http(s)
            for line in body.lines() {
                let line = line.trim();
                if line.starts_with("File") {
                    if let Some((_, value)) = line.split_once('=') {
                        if value.starts_with("http") {
                            return Some(value.to_string());
                        }
                    }
                }
            }
            None
        }
        PlaylistKind::M3u => {
            // Primera línea no vacía, no comentario, que sea http(s)
            for line in body.lines() {
                let line = line.trim();
                if !line.is_empty() && !line.starts_with('#') && line.starts_with("http") {
                    return Some(line.to_string());
                }
            }
            None
        }
    }
}
