//! Fakes compartidos para los tests del núcleo: transporte de voz con
//! guion de fallos, ocupación configurable y sink de notificaciones que
//! registra lo emitido.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::radio::resolver::StreamProber;
use crate::radio::stations::Station;
use crate::voice::{ChannelOccupancy, TextNotifier, TransportError, VoiceTransport};

pub fn station(name: &str, url: &str) -> Station {
    Station {
        name: name.to_string(),
        url: url.to_string(),
        description: None,
        added_by: Some(1),
        added_at: Some(Utc::now()),
    }
}

/// Resultado programado para un intento de conexión del fake.
#[derive(Debug, Clone, Copy)]
pub enum ConnectOutcome {
    Ok,
    Timeout,
    AlreadyConnected,
    Closed,
}

#[derive(Default)]
pub struct FakeTransport {
    channels: DashMap<GuildId, ChannelId>,
    /// Resultados a consumir en orden; agotado el guion, todo conecta bien.
    pub connect_script: Mutex<Vec<ConnectOutcome>>,
    pub connect_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
    pub play_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub fail_playback: AtomicBool,
    /// Conexiones que nunca completan, para probar la preempción de Stop.
    pub hang_connect: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(outcomes: Vec<ConnectOutcome>) -> Self {
        let transport = Self::default();
        *transport.connect_script.lock() = outcomes;
        transport
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> std::result::Result<(), TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);

        if self.hang_connect.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }

        let outcome = {
            let mut script = self.connect_script.lock();
            if script.is_empty() {
                ConnectOutcome::Ok
            } else {
                script.remove(0)
            }
        };

        match outcome {
            ConnectOutcome::Ok => {
                self.channels.insert(guild_id, channel_id);
                Ok(())
            }
            ConnectOutcome::Timeout => Err(TransportError::Timeout),
            ConnectOutcome::AlreadyConnected => Err(TransportError::AlreadyConnected),
            ConnectOutcome::Closed => Err(TransportError::Closed("4006".to_string())),
        }
    }

    async fn disconnect(&self, guild_id: GuildId) -> std::result::Result<(), TransportError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.channels.remove(&guild_id);
        Ok(())
    }

    async fn play(
        &self,
        _guild_id: GuildId,
        _url: &str,
    ) -> std::result::Result<(), TransportError> {
        self.play_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_playback.load(Ordering::SeqCst) {
            return Err(TransportError::Playback("unsupported codec".to_string()));
        }
        Ok(())
    }

    async fn stop(&self, _guild_id: GuildId) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.channels.get(&guild_id).map(|entry| *entry.value())
    }
}

#[derive(Default)]
pub struct FakeOccupancy {
    counts: DashMap<(GuildId, ChannelId), usize>,
}

impl FakeOccupancy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, guild_id: GuildId, channel_id: ChannelId, non_bots: usize) {
        self.counts.insert((guild_id, channel_id), non_bots);
    }
}

impl ChannelOccupancy for FakeOccupancy {
    fn non_bot_members(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<usize> {
        self.counts.get(&(guild_id, channel_id)).map(|entry| *entry.value())
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub departures: Mutex<Vec<(GuildId, ChannelId, String)>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TextNotifier for FakeNotifier {
    async fn idle_departure(&self, guild_id: GuildId, channel_id: ChannelId, station_name: &str) {
        self.departures
            .lock()
            .push((guild_id, channel_id, station_name.to_string()));
    }
}

pub struct FakeProber {
    pub reachable: AtomicBool,
}

impl FakeProber {
    pub fn reachable() -> Self {
        Self {
            reachable: AtomicBool::new(true),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StreamProber for FakeProber {
    async fn probe(&self, _url: &str) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}
