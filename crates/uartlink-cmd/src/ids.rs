//! Command id allocation.
//!
//! Ids are split into ranges by subsystem. The ranges are a convention for
//! collaborators registering commands; the dispatcher only enforces that
//! ids are unique.

/// Does nothing, returns 0.
pub const NULL: u16 = 0;

/// Does nothing, returns 1.
pub const NOOP: u16 = 1;

/// Health check.
pub const IS_READY: u16 = 2;

/// Forget everything known about the MCU (its named callbacks).
pub const RESET: u16 = 3;

/// Register a named callback token.
pub const CB_ADD: u16 = 4;

/// First id of the MQTT range.
pub const MQTT_START: u16 = 10;

/// First id of the REST range.
pub const REST_START: u16 = 20;

/// First id of the socket range.
pub const SOCKET_START: u16 = 30;

/// First user-defined command id.
pub const USER_START: u16 = 40;

/// Returns the name of the range a command id belongs to.
pub fn range_name(id: u16) -> &'static str {
    match id {
        0..MQTT_START => "core",
        MQTT_START..REST_START => "mqtt",
        REST_START..SOCKET_START => "rest",
        SOCKET_START..USER_START => "socket",
        _ => "user",
    }
}

/// Returns true for the built-in core commands.
pub fn is_core(id: u16) -> bool {
    id < MQTT_START
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_boundaries() {
        assert_eq!(range_name(NOOP), "core");
        assert_eq!(range_name(9), "core");
        assert_eq!(range_name(10), "mqtt");
        assert_eq!(range_name(29), "rest");
        assert_eq!(range_name(30), "socket");
        assert_eq!(range_name(40), "user");
        assert_eq!(range_name(u16::MAX), "user");
    }

    #[test]
    fn core_ids_are_core() {
        for id in [NULL, NOOP, IS_READY, RESET, CB_ADD] {
            assert!(is_core(id));
        }
        assert!(!is_core(USER_START));
    }
}
