pub mod intent;

pub use intent::*;

use std::fs::File;
use std::io::{self, Read};

use serde::Deserialize;

struct Defaults {}

impl Defaults {
    fn listen_port() -> u16 {
        179
    }

    fn redistribution_endpoint() -> String {
        "unix:/var/run/routeinstalld.api".to_string()
    }

    fn intent_poll_interval() -> u64 {
        3
    }

    fn rib_poll_interval() -> u64 {
        5
    }
}

/// Daemon startup settings. Everything the excluded startup layer passes in:
/// engine construction parameters and where to find the intended config.
#[derive(Debug, Deserialize)]
pub struct Settings {
    // File holding the intended configuration tree
    pub intent_path: String,

    // Listen port handed to the BGP engine
    #[serde(default = "Defaults::listen_port")]
    pub listen_port: u16,

    // Downstream route-installation channel endpoint
    #[serde(default = "Defaults::redistribution_endpoint")]
    pub redistribution_endpoint: String,

    // Interval (seconds) to re-read the intent file for changes
    #[serde(default = "Defaults::intent_poll_interval")]
    pub intent_poll_interval: u64,

    // Interval (seconds) between RIB queries against the engine
    #[serde(default = "Defaults::rib_poll_interval")]
    pub rib_poll_interval: u64,
}

impl Settings {
    /// Parse a TOML settings file
    pub fn from_file(path: &str) -> io::Result<Settings> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        toml::from_str(&contents).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_settings() {
        let settings = Settings::from_file("./demos/bgpsyncd.toml").unwrap();
        assert_eq!(settings.intent_path, "demos/intent.toml");
        assert_eq!(settings.listen_port, 1179);
        assert_eq!(settings.intent_poll_interval, 3);
        assert_eq!(settings.rib_poll_interval, 5);
    }
}
