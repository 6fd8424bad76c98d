//! Relay configuration

use std::collections::HashSet;
use std::time::Duration;

use crate::channel::{ChannelAttributes, ChannelName, Frame, HostLimits, CAN_DATA_FRAME_SIZE};
use crate::error::ConfigError;
use crate::worker::RunMode;

/// Names of the CAN status channels, in configuration order
pub const DEFAULT_CHANNEL_NAMES: [&str; 4] = [
    "/mq_hv_active",
    "/mq_b2v_st2",
    "/mq_b2v_st4",
    "/mq_b2v_st5",
];

/// Default queue depth per channel
pub const DEFAULT_MAX_MESSAGES: usize = 100;

/// Frames the producer sends on the default channels, by index
pub const DEFAULT_PAYLOADS: [[u8; CAN_DATA_FRAME_SIZE]; 4] = [
    [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07],
    [0x00; CAN_DATA_FRAME_SIZE],
    [0x01; CAN_DATA_FRAME_SIZE],
    [0x02; CAN_DATA_FRAME_SIZE],
];

/// One channel and the payload a producer sends on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: ChannelName,
    pub payload: Frame,
}

impl ChannelSpec {
    pub fn new(name: impl Into<ChannelName>, payload: impl Into<Frame>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }
}

/// Relay configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Channels, in the order workers are spawned
    pub channels: Vec<ChannelSpec>,

    /// Attributes applied to every channel
    pub attributes: ChannelAttributes,

    /// One operation per worker, or loop until shutdown
    pub mode: RunMode,

    /// Delay between sends in continuous mode
    pub send_interval: Duration,

    /// Keep channels open after every worker finished, until a shutdown signal
    pub linger: bool,

    /// Remove channels from the system during shutdown
    pub remove_on_shutdown: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let channels = DEFAULT_CHANNEL_NAMES
            .iter()
            .zip(DEFAULT_PAYLOADS)
            .map(|(name, payload)| ChannelSpec::new(*name, payload))
            .collect();

        Self {
            channels,
            attributes: ChannelAttributes::new(DEFAULT_MAX_MESSAGES, CAN_DATA_FRAME_SIZE),
            mode: RunMode::OneShot,
            send_interval: Duration::from_millis(100),
            linger: true,
            remove_on_shutdown: true,
        }
    }
}

impl RelayConfig {
    /// Replace the channel set
    pub fn channels(mut self, channels: Vec<ChannelSpec>) -> Self {
        self.channels = channels;
        self
    }

    /// Suffix every channel name, so independent relays can share a host
    pub fn instance(mut self, suffix: &str) -> Self {
        for spec in &mut self.channels {
            spec.name = spec.name.with_suffix(suffix);
        }
        self
    }

    /// Set the queue depth
    pub fn max_messages(mut self, max: usize) -> Self {
        self.attributes.max_messages = max;
        self
    }

    /// Set the frame size
    pub fn message_size(mut self, size: usize) -> Self {
        self.attributes.message_size = size;
        self
    }

    /// Set the run mode
    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the delay between continuous sends
    pub fn send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    /// Keep running after all workers finished
    pub fn linger(mut self, linger: bool) -> Self {
        self.linger = linger;
        self
    }

    /// Leave channels in place at shutdown
    pub fn keep_channels(mut self) -> Self {
        self.remove_on_shutdown = false;
        self
    }

    /// Channel names in configuration order
    pub fn names(&self) -> Vec<ChannelName> {
        self.channels.iter().map(|c| c.name.clone()).collect()
    }

    /// Check the configuration against itself and the host's limits
    pub fn validate(&self, limits: &HostLimits) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        if self.attributes.max_messages == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.attributes.message_size == 0 {
            return Err(ConfigError::ZeroMessageSize);
        }

        let mut seen = HashSet::new();
        for spec in &self.channels {
            spec.name.validate()?;
            if !seen.insert(&spec.name) {
                return Err(ConfigError::DuplicateName(spec.name.to_string()));
            }
            if spec.payload.len() != self.attributes.message_size {
                return Err(ConfigError::PayloadSize {
                    channel: spec.name.to_string(),
                    expected: self.attributes.message_size,
                    actual: spec.payload.len(),
                });
            }
        }

        check_limit(
            "max_messages",
            self.attributes.max_messages as u64,
            limits.max_messages,
        )?;
        check_limit(
            "message_size",
            self.attributes.message_size as u64,
            limits.max_message_size,
        )?;
        check_limit("channels", self.channels.len() as u64, limits.max_queues)?;

        Ok(())
    }
}

fn check_limit(setting: &'static str, requested: u64, limit: Option<u64>) -> Result<(), ConfigError> {
    match limit {
        Some(limit) if requested > limit => Err(ConfigError::ExceedsHostLimit {
            setting,
            requested,
            limit,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        assert_eq!(config.channels.len(), 4);
        assert_eq!(config.channels[0].name.as_str(), "/mq_hv_active");
        assert_eq!(config.channels[3].name.as_str(), "/mq_b2v_st5");
        assert_eq!(
            config.channels[0].payload.as_bytes(),
            &[0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]
        );
        assert_eq!(config.channels[2].payload.as_bytes(), &[0x01; 8]);
        assert_eq!(config.attributes.max_messages, 100);
        assert_eq!(config.attributes.message_size, 8);
        assert_eq!(config.mode, RunMode::OneShot);
        assert!(config.linger);
        assert!(config.remove_on_shutdown);
        assert!(config.validate(&HostLimits::unlimited()).is_ok());
    }

    #[test]
    fn test_builder_instance() {
        let config = RelayConfig::default().instance("test1");

        assert_eq!(config.names()[1].as_str(), "/mq_b2v_st2_test1");
        assert!(config.validate(&HostLimits::unlimited()).is_ok());
    }

    #[test]
    fn test_builder_chaining() {
        let config = RelayConfig::default()
            .max_messages(10)
            .mode(RunMode::Continuous)
            .send_interval(Duration::from_millis(5))
            .linger(false)
            .keep_channels();

        assert_eq!(config.attributes.max_messages, 10);
        assert_eq!(config.mode, RunMode::Continuous);
        assert_eq!(config.send_interval, Duration::from_millis(5));
        assert!(!config.linger);
        assert!(!config.remove_on_shutdown);
    }

    #[test]
    fn test_validate_zero_values() {
        let limits = HostLimits::unlimited();

        let err = RelayConfig::default().max_messages(0).validate(&limits);
        assert_eq!(err, Err(ConfigError::ZeroCapacity));

        let err = RelayConfig::default().message_size(0).validate(&limits);
        assert_eq!(err, Err(ConfigError::ZeroMessageSize));

        let err = RelayConfig::default().channels(Vec::new()).validate(&limits);
        assert_eq!(err, Err(ConfigError::NoChannels));
    }

    #[test]
    fn test_validate_payload_size() {
        let config = RelayConfig::default().message_size(16);

        assert!(matches!(
            config.validate(&HostLimits::unlimited()),
            Err(ConfigError::PayloadSize {
                expected: 16,
                actual: 8,
                ..
            })
        ));
    }

    #[test]
    fn test_validate_names() {
        let limits = HostLimits::unlimited();

        let config = RelayConfig::default().channels(vec![ChannelSpec::new("no_slash", [0u8; 8])]);
        assert!(matches!(
            config.validate(&limits),
            Err(ConfigError::InvalidName(_))
        ));

        let config = RelayConfig::default().channels(vec![
            ChannelSpec::new("/same", [0u8; 8]),
            ChannelSpec::new("/same", [1u8; 8]),
        ]);
        assert_eq!(
            config.validate(&limits),
            Err(ConfigError::DuplicateName("/same".into()))
        );
    }

    #[test]
    fn test_validate_host_limits() {
        let limits = HostLimits {
            max_messages: Some(10),
            max_message_size: Some(8192),
            max_queues: Some(256),
        };

        assert_eq!(
            RelayConfig::default().validate(&limits),
            Err(ConfigError::ExceedsHostLimit {
                setting: "max_messages",
                requested: 100,
                limit: 10,
            })
        );
        assert!(RelayConfig::default()
            .max_messages(10)
            .validate(&limits)
            .is_ok());

        let tight = HostLimits {
            max_queues: Some(3),
            ..HostLimits::unlimited()
        };
        assert!(matches!(
            RelayConfig::default().validate(&tight),
            Err(ConfigError::ExceedsHostLimit {
                setting: "channels",
                ..
            })
        ));
    }
}
