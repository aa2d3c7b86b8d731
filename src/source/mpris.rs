//! MPRIS source: polls media players on a D-Bus bus.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use zbus::fdo::DBusProxy;
use zbus::names::InterfaceName;
use zbus::zvariant::{OwnedValue, Value};
use zbus::Connection;

use crate::error::{Error, Result};

use super::{PlayerSnapshot, Source};

const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";
const MPRIS_PATH: &str = "/org/mpris/MediaPlayer2";
const MPRIS_PLAYER_IFACE: &str = "org.mpris.MediaPlayer2.Player";

/// Polls every MPRIS player on the bus and reports the first one that is
/// playing, falling back to a paused one.
pub struct MprisSource {
    connection: Connection,
}

impl MprisSource {
    /// Connect to the session bus, or to an explicit bus address.
    pub async fn connect(address: &str) -> Result<Self> {
        let connection = if address.is_empty() {
            debug!("connecting to session bus");
            Connection::session().await?
        } else {
            debug!(address, "connecting to bus");
            zbus::connection::Builder::address(address)?.build().await?
        };

        Ok(Self { connection })
    }

    async fn read_player(&self, name: &str) -> Result<Option<PlayerSnapshot>> {
        let proxy = zbus::fdo::PropertiesProxy::builder(&self.connection)
            .destination(name)?
            .path(MPRIS_PATH)?
            .build()
            .await?;

        let iface = InterfaceName::try_from(MPRIS_PLAYER_IFACE)
            .map_err(|e| Error::other(e.to_string()))?;

        let status = proxy.get(iface.clone(), "PlaybackStatus").await?;
        let playing = match extract_string(&status).as_deref() {
            Some("Playing") => true,
            Some("Paused") => false,
            _ => return Ok(None),
        };

        let metadata = proxy.get(iface.clone(), "Metadata").await?;
        let metadata = HashMap::<String, OwnedValue>::try_from(metadata)
            .map_err(|_| Error::other("failed to parse player metadata"))?;

        // Some players do not expose Position at all.
        let position = match proxy.get(iface, "Position").await {
            Ok(value) => extract_i64(&value)
                .and_then(|us| u64::try_from(us).ok())
                .map(Duration::from_micros),
            Err(_) => None,
        };

        Ok(parse_snapshot(&metadata, playing, position))
    }
}

#[async_trait]
impl Source for MprisSource {
    fn name(&self) -> &str {
        "dbus"
    }

    async fn poll(&self) -> Result<Option<PlayerSnapshot>> {
        let dbus = DBusProxy::new(&self.connection).await?;
        let names = dbus.list_names().await?;

        let mut paused = None;
        for name in names {
            let name = name.as_str();
            if !name.starts_with(MPRIS_PREFIX) {
                continue;
            }

            // A single misbehaving player must not take down the whole poll.
            match self.read_player(name).await {
                Ok(Some(snapshot)) => {
                    if snapshot.playing {
                        return Ok(Some(snapshot));
                    }
                    if paused.is_none() {
                        paused = Some(snapshot);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!(player = name, error = %e, "failed to read player, skipping"),
            }
        }

        Ok(paused)
    }
}

/// Map MPRIS metadata to a snapshot; a track without a title is treated as
/// nothing playing.
fn parse_snapshot(
    metadata: &HashMap<String, OwnedValue>,
    playing: bool,
    position: Option<Duration>,
) -> Option<PlayerSnapshot> {
    let track = metadata.get("xesam:title").and_then(extract_string)?;

    let artists = metadata
        .get("xesam:artist")
        .and_then(extract_string_array)
        .unwrap_or_default();

    let album = metadata
        .get("xesam:album")
        .and_then(extract_string)
        .unwrap_or_default();

    let length = metadata
        .get("mpris:length")
        .and_then(extract_i64)
        .and_then(|us| u64::try_from(us).ok())
        .filter(|us| *us > 0)
        .map(Duration::from_micros);

    Some(PlayerSnapshot {
        artists,
        track,
        album,
        length,
        position,
        playing,
    })
}

fn extract_string(value: &OwnedValue) -> Option<String> {
    if let Ok(Value::Str(s)) = value.try_into() {
        return Some(s.to_string());
    }
    <&str>::try_from(value)
        .map(String::from)
        .or_else(|_| String::try_from(value.clone()))
        .ok()
}

/// Extract a string array, falling back to a single string.
fn extract_string_array(value: &OwnedValue) -> Option<Vec<String>> {
    Vec::<String>::try_from(value.clone())
        .ok()
        .filter(|arr| !arr.is_empty())
        .or_else(|| extract_string(value).map(|s| vec![s]))
}

fn extract_i64(value: &OwnedValue) -> Option<i64> {
    i64::try_from(value.clone())
        .ok()
        .or_else(|| match Value::from(value.clone()) {
            Value::I64(v) => Some(v),
            Value::I32(v) => Some(i64::from(v)),
            Value::U64(v) => i64::try_from(v).ok(),
            Value::U32(v) => Some(i64::from(v)),
            _ => None,
        })
}
