use rumqttc::QoS;
use serde::{Deserialize, Serialize};

/// Connection options for one session.
///
/// QoS and retain act as defaults for publishes that do not override them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub broker: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            qos: 0,
            retain: false,
        }
    }
}

impl SessionOptions {
    pub fn new(broker: impl Into<String>, port: u16) -> Self {
        Self {
            broker: broker.into(),
            port,
            ..Self::default()
        }
    }

    /// Checks the synchronously verifiable parts of the options.
    pub fn validate(&self) -> Result<(), String> {
        if self.broker.trim().is_empty() {
            return Err("broker host must not be empty".to_string());
        }
        if self.port == 0 {
            return Err("port must be in range 1-65535".to_string());
        }
        if self.qos > 2 {
            return Err(format!("qos must be 0, 1 or 2, got {}", self.qos));
        }
        Ok(())
    }

    pub fn qos_level(&self) -> QoS {
        match self.qos {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtMostOnce,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate() {
        assert!(SessionOptions::default().validate().is_ok());
    }

    #[test]
    fn empty_broker_is_rejected() {
        let options = SessionOptions::new("  ", 1883);
        assert!(options.validate().is_err());
    }

    #[test]
    fn port_zero_is_rejected() {
        let options = SessionOptions::new("localhost", 0);
        assert!(options.validate().unwrap_err().contains("port"));
    }

    #[test]
    fn qos_above_two_is_rejected() {
        let options = SessionOptions {
            qos: 3,
            ..SessionOptions::default()
        };
        assert!(options.validate().unwrap_err().contains("qos"));
    }

    #[test]
    fn qos_levels_map_to_transport_values() {
        let mut options = SessionOptions::default();
        assert_eq!(options.qos_level(), QoS::AtMostOnce);
        options.qos = 1;
        assert_eq!(options.qos_level(), QoS::AtLeastOnce);
        options.qos = 2;
        assert_eq!(options.qos_level(), QoS::ExactlyOnce);
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let options: SessionOptions =
            toml::from_str("broker = \"test.mosquitto.org\"\nport = 8883\n").expect("parse");
        assert_eq!(options.broker, "test.mosquitto.org");
        assert_eq!(options.port, 8883);
        assert_eq!(options.username, None);
        assert_eq!(options.qos, 0);
        assert!(!options.retain);
    }
}
