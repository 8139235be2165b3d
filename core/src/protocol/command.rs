//! Outbound command encoding.
//!
//! Commands are encoded as pipe-delimited text, `{TYPE}|{ACTION}|{KEY=VALUE}|...`,
//! with a fixed field order per command type. The firmware parses these
//! positionally, so the order must not change. Values are embedded verbatim;
//! `|` or `=` inside an SSID is a known protocol limitation, not escaped.

use serde::{Deserialize, Serialize};

/// Operator intents sent to the peripheral over the command characteristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Start sniffing a target network.
    SniffStart {
        ssid: String,
        bssid: String,
        channel: i32,
    },
    /// Stop the active sniff.
    SniffStop,
    /// Start deauthenticating a station from an access point.
    DeauthStart {
        target_mac: String,
        ap_mac: String,
        channel: i32,
    },
    /// Stop the active deauth.
    DeauthStop,
    /// Start broadcasting a beacon.
    BeaconStart { ssid: String, channel: i32 },
    /// Clear the peripheral's recorded MAC table.
    ClearMac,
    /// Clear the peripheral's Wi-Fi target state.
    ClearWifi,
}

impl Command {
    /// Encode to the wire payload. Total and deterministic: every variant
    /// has exactly one encoding.
    pub fn encode(&self) -> String {
        match self {
            Command::SniffStart {
                ssid,
                bssid,
                channel,
            } => format!("SNIFF|START|SSID={ssid}|BSSID={bssid}|CHANNEL={channel}"),
            Command::SniffStop => "SNIFF|STOP".to_string(),
            Command::DeauthStart {
                target_mac,
                ap_mac,
                channel,
            } => format!("DEAUTH|START|TARGET={target_mac}|AP={ap_mac}|CHANNEL={channel}"),
            Command::DeauthStop => "DEAUTH|STOP".to_string(),
            Command::BeaconStart { ssid, channel } => {
                format!("BEACON|START|SSID={ssid}|CHANNEL={channel}")
            }
            Command::ClearMac => "MAC|CLEAR".to_string(),
            Command::ClearWifi => "WIFI|CLEAR".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_start_encoding() {
        let cmd = Command::SniffStart {
            ssid: "Home".to_string(),
            bssid: "AA:BB:CC:DD:EE:FF".to_string(),
            channel: 6,
        };
        assert_eq!(
            cmd.encode(),
            "SNIFF|START|SSID=Home|BSSID=AA:BB:CC:DD:EE:FF|CHANNEL=6"
        );
    }

    #[test]
    fn test_sniff_stop_encoding() {
        assert_eq!(Command::SniffStop.encode(), "SNIFF|STOP");
    }

    #[test]
    fn test_deauth_start_encoding() {
        let cmd = Command::DeauthStart {
            target_mac: "11:22:33:44:55:66".to_string(),
            ap_mac: "AA:BB:CC:DD:EE:FF".to_string(),
            channel: 11,
        };
        assert_eq!(
            cmd.encode(),
            "DEAUTH|START|TARGET=11:22:33:44:55:66|AP=AA:BB:CC:DD:EE:FF|CHANNEL=11"
        );
    }

    #[test]
    fn test_deauth_stop_encoding() {
        assert_eq!(Command::DeauthStop.encode(), "DEAUTH|STOP");
    }

    #[test]
    fn test_beacon_start_encoding() {
        let cmd = Command::BeaconStart {
            ssid: "FreeWifi".to_string(),
            channel: 1,
        };
        assert_eq!(cmd.encode(), "BEACON|START|SSID=FreeWifi|CHANNEL=1");
    }

    #[test]
    fn test_clear_encodings() {
        assert_eq!(Command::ClearMac.encode(), "MAC|CLEAR");
        assert_eq!(Command::ClearWifi.encode(), "WIFI|CLEAR");
    }

    #[test]
    fn test_encoding_is_stable_across_calls() {
        let cmd = Command::BeaconStart {
            ssid: "net".to_string(),
            channel: 3,
        };
        assert_eq!(cmd.encode(), cmd.encode());
    }

    #[test]
    fn test_values_are_not_escaped() {
        // Known protocol limitation: delimiter characters pass through as-is.
        let cmd = Command::BeaconStart {
            ssid: "a|b=c".to_string(),
            channel: 9,
        };
        assert_eq!(cmd.encode(), "BEACON|START|SSID=a|b=c|CHANNEL=9");
    }
}
