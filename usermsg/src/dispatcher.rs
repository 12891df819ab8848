use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use serde_json::json;
use tracing::{debug, info};
use zenoh::{Session, Wait};

use crate::Builder;
use crate::config;
use crate::envelope::{DEFAULT_MAX_PAYLOAD, SendReceipt, UserMessage};
use crate::error::{Error, Result};
use crate::recipients::{RecipientFilter, RecipientIndex};
use crate::registry::{DialogType, MessageRegistry};
use crate::transport::{MessageListener, Transport, ZenohTransport};

/// Environment variable naming a zenoh config file.
pub const CONFIG_FILE_ENV: &str = "USERMSG_CONFIG_FILE";
/// Environment variable holding `key=value;key=value` config overrides.
pub const CONFIG_OVERRIDE_ENV: &str = "USERMSG_CONFIG_OVERRIDE";
/// Default root of the per-recipient key expressions.
pub const DEFAULT_KEY_PREFIX: &str = "usermsg";

pub struct DispatcherBuilder {
    config_file: Option<PathBuf>,
    config_overrides: Vec<(String, serde_json::Value)>,
    invalid_overrides: Vec<String>,
    key_prefix: String,
    max_payload: usize,
    registry: Option<MessageRegistry>,
    transport: Option<Arc<dyn Transport>>,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self {
            config_file: None,
            config_overrides: Vec::new(),
            invalid_overrides: Vec::new(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_payload: DEFAULT_MAX_PAYLOAD,
            registry: None,
            transport: None,
        }
    }
}

impl DispatcherBuilder {
    /// Load zenoh configuration from a file
    pub fn with_config_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Add a JSON configuration override
    ///
    /// # Example
    /// ```no_run
    /// use serde_json::json;
    /// use usermsg::{Builder, DispatcherBuilder};
    ///
    /// let dispatcher = DispatcherBuilder::default()
    ///     .with_json("scouting/multicast/enabled", json!(false))
    ///     .with_json("connect/endpoints", json!(["tcp/127.0.0.1:7447"]))
    ///     .build()?;
    /// # Ok::<(), usermsg::Error>(())
    /// ```
    pub fn with_json<K: Into<String>, V: serde::Serialize>(mut self, key: K, value: V) -> Self {
        let key = key.into();
        match serde_json::to_value(&value) {
            Ok(value_json) => self.config_overrides.push((key, value_json)),
            Err(e) => self.invalid_overrides.push(format!("{}: {}", key, e)),
        }
        self
    }

    /// Convenience method: disable multicast scouting
    pub fn disable_multicast_scouting(self) -> Self {
        self.with_json("scouting/multicast/enabled", json!(false))
    }

    /// Convenience method: connect to specific endpoints
    pub fn with_connect_endpoints<I, S>(self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints: Vec<String> = endpoints.into_iter().map(|s| s.into()).collect();
        self.with_json("connect/endpoints", json!(endpoints))
    }

    /// Convenience method: listen on specific endpoints
    pub fn with_listen_endpoints<I, S>(self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let endpoints: Vec<String> = endpoints.into_iter().map(|s| s.into()).collect();
        self.with_json("listen/endpoints", json!(endpoints))
    }

    /// Convenience method: set mode (peer, client, router)
    pub fn with_mode<S: Into<String>>(self, mode: S) -> Self {
        self.with_json("mode", json!(mode.into()))
    }

    /// Root of the `<prefix>/<recipient>/<message_name>` keys
    pub fn with_key_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Limit for encoded protobuf payloads
    pub fn with_max_payload_size(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Use this registry instead of a copy of the global one
    pub fn with_registry(mut self, registry: MessageRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Deliver through `transport`; no zenoh session is opened
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Parse and apply overrides from the environment
    ///
    /// Expected format: `key1=value1;key2=value2`, values are JSON5.
    ///
    /// ```text
    /// export USERMSG_CONFIG_OVERRIDE='mode="client";connect/endpoints=["tcp/192.168.1.1:7447"]'
    /// ```
    fn apply_env_overrides(mut self) -> Result<Self> {
        if let Ok(overrides_str) = std::env::var(CONFIG_OVERRIDE_ENV) {
            debug!(
                "Applying config overrides from {}: {}",
                CONFIG_OVERRIDE_ENV, overrides_str
            );
            self.config_overrides
                .extend(parse_overrides(&overrides_str)?);
        }
        Ok(self)
    }

    fn zenoh_config(self) -> Result<(zenoh::Config, Self)> {
        // Priority order:
        // 1. Config file passed via with_config_file()
        // 2. USERMSG_CONFIG_FILE environment variable
        // 3. Built-in session defaults
        let mut config = if let Some(ref config_file) = self.config_file {
            zenoh::Config::from_file(config_file)?
        } else if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            zenoh::Config::from_file(path)?
        } else {
            config::session_config()?
        };

        let mut this = self.apply_env_overrides()?;
        for (key, value) in std::mem::take(&mut this.config_overrides) {
            let value_str = serde_json::to_string(&value).map_err(|e| {
                Error::Config(format!("failed to serialize value for key '{}': {}", key, e))
            })?;
            config.insert_json5(&key, &value_str).map_err(|e| {
                Error::Config(format!(
                    "failed to apply config override '{}' = '{}': {}",
                    key, value_str, e
                ))
            })?;
        }
        Ok((config, this))
    }
}

/// Parse `key=value;key=value` with JSON5 values.
pub fn parse_overrides(overrides: &str) -> Result<Vec<(String, serde_json::Value)>> {
    let mut parsed = Vec::new();
    for pair in overrides.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }

        // Split on first '=' only
        let Some((key, value)) = pair.split_once('=') else {
            return Err(Error::Config(format!(
                "invalid override '{}', expected 'key=value'",
                pair
            )));
        };
        let (key, value) = (key.trim(), value.trim());
        let json_value = json5::from_str::<serde_json::Value>(value).map_err(|e| {
            Error::Config(format!(
                "failed to parse override value for key '{}': {} (value: {})",
                key, e, value
            ))
        })?;
        debug!("Override: {} = {}", key, json_value);
        parsed.push((key.to_string(), json_value));
    }
    Ok(parsed)
}

impl Builder for DispatcherBuilder {
    type Output = Dispatcher;

    fn build(self) -> Result<Dispatcher> {
        if !self.invalid_overrides.is_empty() {
            return Err(Error::Config(format!(
                "unserializable overrides: {}",
                self.invalid_overrides.join(", ")
            )));
        }

        let registry = match &self.registry {
            Some(registry) => registry.clone(),
            None => MessageRegistry::global().read().clone(),
        };

        if let Some(transport) = self.transport.clone() {
            info!("[DSP] Dispatcher ready: transport={:?}", transport);
            return Ok(Dispatcher {
                session: None,
                transport,
                registry: RwLock::new(registry),
                key_prefix: self.key_prefix,
                max_payload: self.max_payload,
            });
        }

        let (config, this) = self.zenoh_config()?;
        let session = Arc::new(zenoh::open(config).wait()?);
        let transport = Arc::new(ZenohTransport::new(session.clone(), this.key_prefix.clone()));
        info!(
            "[DSP] Dispatcher ready: zid={}, prefix={}",
            session.zid(),
            this.key_prefix
        );

        Ok(Dispatcher {
            session: Some(session),
            transport,
            registry: RwLock::new(registry),
            key_prefix: this.key_prefix,
            max_payload: this.max_payload,
        })
    }
}

/// Creates and sends user messages.
pub struct Dispatcher {
    session: Option<Arc<Session>>,
    transport: Arc<dyn Transport>,
    registry: RwLock<MessageRegistry>,
    key_prefix: String,
    max_payload: usize,
}

impl Dispatcher {
    /// Envelope for `message_name`, ready to be populated.
    pub fn create(
        &self,
        recipients: Arc<dyn RecipientFilter>,
        message_name: &str,
    ) -> Result<UserMessage> {
        let registry = self.registry.read();
        let msg = UserMessage::create(recipients, message_name, &registry, self.transport.clone())?;
        Ok(msg.with_max_payload(self.max_payload))
    }

    /// Create, populate from `data` and send in one step.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use serde_json::json;
    /// use usermsg::{Builder, ChannelTransport, DispatcherBuilder, RecipientSet};
    ///
    /// let (transport, rx) = ChannelTransport::pair();
    /// let dispatcher = DispatcherBuilder::default()
    ///     .with_transport(Arc::new(transport))
    ///     .build()?;
    /// dispatcher.create_message(
    ///     Arc::new(RecipientSet::single(1)),
    ///     "VGUIMenu",
    ///     &json!({"panel_name": "info", "show": true}),
    /// )?;
    /// assert_eq!(rx.len(), 1);
    /// # Ok::<(), usermsg::Error>(())
    /// ```
    pub fn create_message(
        &self,
        recipients: Arc<dyn RecipientFilter>,
        message_name: &str,
        data: &serde_json::Value,
    ) -> Result<SendReceipt> {
        let mut msg = self.create(recipients, message_name)?;
        msg.populate(data)?;
        msg.send()
    }

    /// Send a plugin dialog of `dialog_type`; `data` fills the other fields.
    pub fn create_dialog(
        &self,
        recipients: Arc<dyn RecipientFilter>,
        dialog_type: DialogType,
        data: &serde_json::Value,
    ) -> Result<SendReceipt> {
        let mut msg = self.create(recipients, "Dialog")?;
        let dialog = msg.protobuf_mut()?;
        dialog.populate_from_json(data)?;
        dialog.set_enum("type", dialog_type.value())?;
        debug!("[DSP] Dialog type={}", dialog_type);
        msg.send()
    }

    /// Zenoh listener for messages addressed to `recipient`, or to anyone.
    pub fn listener(&self, recipient: Option<RecipientIndex>) -> Result<MessageListener> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| Error::Config("dispatcher has no zenoh session".into()))?;
        MessageListener::new(session, &self.key_prefix, recipient)
            .map_err(|e| Error::Zenoh(e.to_string()))
    }

    pub fn registry(&self) -> RwLockReadGuard<'_, MessageRegistry> {
        self.registry.read()
    }

    pub fn register_protobuf(
        &self,
        name: &str,
        index: i32,
        schema: Arc<crate::dynamic::MessageSchema>,
    ) -> Result<()> {
        self.registry.write().register_protobuf(name, index, schema)
    }

    pub fn register_legacy(&self, name: &str, index: i32) -> Result<()> {
        self.registry.write().register_legacy(name, index)
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn shutdown(&self) -> Result<()> {
        if let Some(session) = &self.session {
            session.close().wait()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_overrides() {
        let parsed =
            parse_overrides(r#"mode="client"; connect/endpoints=['tcp/10.0.0.1:7447'];"#).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], ("mode".to_string(), json!("client")));
        assert_eq!(parsed[1].1, json!(["tcp/10.0.0.1:7447"]));
    }

    #[test]
    fn test_parse_overrides_rejects_garbage() {
        assert!(matches!(parse_overrides("mode"), Err(Error::Config(_))));
        assert!(matches!(parse_overrides("mode={"), Err(Error::Config(_))));
    }

    #[test]
    fn test_listener_needs_session() {
        let (transport, _rx) = crate::ChannelTransport::pair();
        let dispatcher = DispatcherBuilder::default()
            .with_transport(Arc::new(transport))
            .build()
            .unwrap();
        assert!(dispatcher.session().is_none());
        assert!(matches!(dispatcher.listener(None), Err(Error::Config(_))));
        dispatcher.shutdown().unwrap();
    }
}
