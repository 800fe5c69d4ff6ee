/// [`Relay`] implementation that publishes presence to a single Nostr relay.
///
/// Each delivery opens its own client: connect, send every message in order,
/// disconnect. Notes are kind 1 text notes; status records are NIP-38 user
/// statuses (kind 30315) with a `d` tag naming the status slot.
use anyhow::{Context, Result};
use nostr_sdk::prelude::*;
use tracing::{debug, error};

use crate::config::RelayConfig;
use crate::notifier::{PresenceMessage, Relay as PresenceRelay};

pub const DEFAULT_RELAY_URL: &str = "wss://nos.lol/";
const USER_STATUS_KIND: u16 = 30315;
const SEQ_TAG: &str = "seq";

pub struct NostrRelay {
    keys: Keys,
    url: String,
}

impl NostrRelay {
    /// Signs with `secret_key` (nsec or hex). Without one an ephemeral key is
    /// generated, which is only useful for testing a relay setup.
    pub fn new(url: impl Into<String>, secret_key: Option<&str>) -> Result<Self> {
        let keys = match secret_key {
            Some(secret) => Keys::parse(secret).context("Invalid relay secret key")?,
            None => Keys::generate(),
        };
        Ok(Self {
            keys,
            url: url.into(),
        })
    }

    /// Builds the relay described by `config`. Disabled relays and invalid
    /// keys yield `None`, which turns publishing off.
    pub fn from_config(config: &RelayConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        match Self::new(config.url.clone(), config.secret_key.as_deref()) {
            Ok(relay) => Some(relay),
            Err(e) => {
                error!("{e:#}; presence will not be published");
                None
            }
        }
    }

    #[cfg(test)]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Maps a presence message onto the Nostr event it is published as.
pub fn event_builder(message: &PresenceMessage) -> EventBuilder {
    match message {
        PresenceMessage::Note { content } => EventBuilder::text_note(content),
        PresenceMessage::Status {
            identifier,
            content,
            seq,
        } => EventBuilder::new(Kind::from(USER_STATUS_KIND), content).tags([
            Tag::identifier(identifier),
            Tag::custom(TagKind::Custom(SEQ_TAG.into()), [seq.to_string()]),
        ]),
    }
}

impl PresenceRelay for NostrRelay {
    async fn publish(&self, messages: Vec<PresenceMessage>) -> Result<()> {
        let client = Client::new(self.keys.clone());
        client
            .add_write_relay(self.url.as_str())
            .await
            .with_context(|| format!("Failed to add relay {}", self.url))?;
        client.connect().await;

        let mut result = Ok(());
        for message in &messages {
            match client.send_event_builder(event_builder(message)).await {
                Ok(output) => debug!(relay = %self.url, id = %output.val, "event sent"),
                Err(e) => {
                    result = Err(e).with_context(|| format!("Relay {} rejected event", self.url));
                    break;
                }
            }
        }

        let _ = client.disconnect().await;
        result
    }
}
