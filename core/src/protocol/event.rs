//! Inbound notification decoding.
//!
//! Frames arrive as UTF-8 text on the status characteristic:
//! `TYPE|CHANNEL|key=value|key=value|...` with `TYPE` one of `LOG`, `MAC`,
//! `STATUS`, `ERROR` and `CHANNEL` a free-form attack-mode tag (`SNIFF`,
//! `DEAUTH`, ...). The peripheral emits these over a noisy radio link, so
//! decoding is total: anything structurally off becomes [`Event::Unrecognized`]
//! instead of an error. A frame either decodes completely or not at all:
//! a `MAC` frame with an unparseable `rssi` is unrecognized, never a partial
//! sighting.
//!
//! Which channel tags are acted on is routing policy and lives in the
//! session controller, not here.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Decoded notification frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A display log line for an attack channel.
    LogEntry { channel: String, message: String },
    /// A station sighting reported during a sniff.
    MacSighting {
        channel: String,
        mac: String,
        rssi: i32,
        channel_num: i32,
    },
    /// Peripheral-side status change (`STARTED`, `STOPPED`, ...).
    StatusUpdate { channel: String, value: String },
    /// Peripheral-side error report for an attack channel.
    ErrorReport { channel: String, message: String },
    /// Anything that did not decode; carries the raw frame for diagnostics.
    Unrecognized { raw: String },
}

impl Event {
    fn unrecognized(raw: &str) -> Self {
        Event::Unrecognized {
            raw: raw.to_string(),
        }
    }
}

/// Decode one raw notification payload. Never fails; see module docs for the
/// degradation contract.
pub fn parse(raw: &str) -> Event {
    let parts: Vec<&str> = raw.trim().split('|').collect();
    if parts.len() < 2 {
        return Event::unrecognized(raw);
    }

    let type_tag = parts[0];
    let channel = parts[1];

    // key=value fields: split on the first '=' so values may contain '='.
    // Segments without '=' are dropped; duplicate keys last-write-wins.
    let mut fields: HashMap<&str, &str> = HashMap::new();
    for segment in &parts[2..] {
        if let Some((key, value)) = segment.split_once('=') {
            fields.insert(key, value);
        }
    }

    match type_tag {
        "LOG" => match fields.get("msg") {
            Some(msg) => Event::LogEntry {
                channel: channel.to_string(),
                message: (*msg).to_string(),
            },
            None => Event::unrecognized(raw),
        },
        "MAC" => {
            let mac = match fields.get("mac") {
                Some(mac) => (*mac).to_string(),
                None => return Event::unrecognized(raw),
            };
            let rssi = match fields.get("rssi").and_then(|v| v.parse::<i32>().ok()) {
                Some(rssi) => rssi,
                None => return Event::unrecognized(raw),
            };
            let channel_num = match fields.get("ch").and_then(|v| v.parse::<i32>().ok()) {
                Some(ch) => ch,
                None => return Event::unrecognized(raw),
            };
            Event::MacSighting {
                channel: channel.to_string(),
                mac,
                rssi,
                channel_num,
            }
        }
        "STATUS" => match fields.get("value") {
            Some(value) => Event::StatusUpdate {
                channel: channel.to_string(),
                value: (*value).to_string(),
            },
            None => Event::unrecognized(raw),
        },
        "ERROR" => match fields.get("msg") {
            Some(msg) => Event::ErrorReport {
                channel: channel.to_string(),
                message: (*msg).to_string(),
            },
            None => Event::unrecognized(raw),
        },
        _ => Event::unrecognized(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_mac_sighting() {
        let event = parse("MAC|SNIFF|mac=AA:BB:CC:DD:EE:FF|rssi=-42|ch=6");
        assert_eq!(
            event,
            Event::MacSighting {
                channel: "SNIFF".to_string(),
                mac: "AA:BB:CC:DD:EE:FF".to_string(),
                rssi: -42,
                channel_num: 6,
            }
        );
    }

    #[test]
    fn test_parse_status_update() {
        let event = parse("STATUS|DEAUTH|value=RUNNING");
        assert_eq!(
            event,
            Event::StatusUpdate {
                channel: "DEAUTH".to_string(),
                value: "RUNNING".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_log_entry() {
        let event = parse("LOG|SNIFF|msg=capture started");
        assert_eq!(
            event,
            Event::LogEntry {
                channel: "SNIFF".to_string(),
                message: "capture started".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_error_report() {
        let event = parse("ERROR|DEAUTH|msg=target lost");
        assert_eq!(
            event,
            Event::ErrorReport {
                channel: "DEAUTH".to_string(),
                message: "target lost".to_string(),
            }
        );
    }

    #[test]
    fn test_too_few_segments_is_unrecognized() {
        for raw in ["", "LOG", "garbage", "MAC"] {
            assert_eq!(
                parse(raw),
                Event::Unrecognized {
                    raw: raw.to_string()
                }
            );
        }
    }

    #[test]
    fn test_unknown_type_tag_is_unrecognized() {
        assert_eq!(
            parse("PING|SNIFF|msg=hello"),
            Event::Unrecognized {
                raw: "PING|SNIFF|msg=hello".to_string()
            }
        );
    }

    #[test]
    fn test_mac_with_bad_rssi_is_unrecognized() {
        // Integer coercion failure invalidates the whole frame.
        let raw = "MAC|SNIFF|mac=AA:BB:CC:DD:EE:FF|rssi=notanumber|ch=6";
        assert_eq!(
            parse(raw),
            Event::Unrecognized {
                raw: raw.to_string()
            }
        );
    }

    #[test]
    fn test_mac_with_missing_channel_is_unrecognized() {
        let raw = "MAC|SNIFF|mac=AA:BB:CC:DD:EE:FF|rssi=-42";
        assert_eq!(
            parse(raw),
            Event::Unrecognized {
                raw: raw.to_string()
            }
        );
    }

    #[test]
    fn test_log_without_msg_is_unrecognized() {
        let raw = "LOG|SNIFF|note=hello";
        assert_eq!(
            parse(raw),
            Event::Unrecognized {
                raw: raw.to_string()
            }
        );
    }

    #[test]
    fn test_value_may_contain_equals() {
        let event = parse("STATUS|SNIFF|value=phase=2");
        assert_eq!(
            event,
            Event::StatusUpdate {
                channel: "SNIFF".to_string(),
                value: "phase=2".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_keys_last_write_wins() {
        let event = parse("STATUS|SNIFF|value=first|value=second");
        assert_eq!(
            event,
            Event::StatusUpdate {
                channel: "SNIFF".to_string(),
                value: "second".to_string(),
            }
        );
    }

    #[test]
    fn test_segments_without_equals_are_dropped() {
        let event = parse("LOG|DEAUTH|junk|msg=ok|more junk");
        assert_eq!(
            event,
            Event::LogEntry {
                channel: "DEAUTH".to_string(),
                message: "ok".to_string(),
            }
        );
    }

    #[test]
    fn test_input_is_trimmed() {
        let event = parse("  STATUS|SNIFF|value=STOPPED \n");
        assert_eq!(
            event,
            Event::StatusUpdate {
                channel: "SNIFF".to_string(),
                value: "STOPPED".to_string(),
            }
        );
    }

    #[test]
    fn test_channel_tag_is_free_form() {
        // Unknown channel tags still decode; ignoring them is the
        // session controller's call.
        let event = parse("MAC|PROBE|mac=00:11:22:33:44:55|rssi=-80|ch=1");
        assert!(matches!(event, Event::MacSighting { channel, .. } if channel == "PROBE"));
    }

    proptest! {
        #[test]
        fn test_parse_never_panics(raw in ".*") {
            let _ = parse(&raw);
        }

        #[test]
        fn test_single_segment_is_always_unrecognized(raw in "[^|]*") {
            prop_assert_eq!(
                parse(&raw),
                Event::Unrecognized { raw: raw.clone() }
            );
        }
    }
}
