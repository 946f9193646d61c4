use crate::constants::limits::MAX_STRING_LENGTH;
use crate::error::{MqttError, Result};

/// Validates an MQTT topic name
///
/// # Rules:
/// - Must have at least one character
/// - Must not contain null characters (U+0000)
/// - Must not exceed 65,535 bytes when UTF-8 encoded
/// - Must not contain wildcard characters (+, #)
#[must_use]
pub fn is_valid_topic_name(topic: &str) -> bool {
    !topic.is_empty()
        && topic.len() <= MAX_STRING_LENGTH as usize
        && !topic.contains(['\0', '+', '#'])
}

/// Validates an MQTT topic filter
///
/// # Rules:
/// - Must follow all topic name rules except wildcard usage
/// - Single-level wildcard (+) must occupy an entire level
/// - Multi-level wildcard (#) must occupy the last level
/// - Examples: sport/+/player, sport/tennis/#, +/tennis/#
#[must_use]
pub fn is_valid_topic_filter(filter: &str) -> bool {
    if filter.is_empty() || filter.len() > MAX_STRING_LENGTH as usize || filter.contains('\0') {
        return false;
    }

    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;

    levels.iter().enumerate().all(|(i, level)| {
        if level.contains('#') {
            *level == "#" && i == last
        } else if level.contains('+') {
            *level == "+"
        } else {
            true
        }
    })
}

/// Client identifiers are sent as an MQTT string: no NUL, at most 65,535 bytes
#[must_use]
pub fn is_valid_client_id(client_id: &str) -> bool {
    client_id.len() <= MAX_STRING_LENGTH as usize && !client_id.contains('\0')
}

/// Validates a topic a message is published to
///
/// # Errors
///
/// Returns `InvalidArgument` if the topic is empty, contains a wildcard or
/// a null character, or is too long
pub fn validate_topic_name(topic: &str) -> Result<()> {
    if topic.is_empty() {
        return Err(MqttError::InvalidArgument(
            "topic must not be empty".to_string(),
        ));
    }
    if !is_valid_topic_name(topic) {
        return Err(MqttError::InvalidArgument(format!(
            "invalid topic name: {topic:?}"
        )));
    }
    Ok(())
}

/// Validates the topic filter a session subscribes to
///
/// # Errors
///
/// Returns `InvalidConfiguration` if the filter is malformed
pub fn validate_topic_filter(filter: &str) -> Result<()> {
    if !is_valid_topic_filter(filter) {
        return Err(MqttError::InvalidConfiguration(format!(
            "invalid topic filter: {filter:?}"
        )));
    }
    Ok(())
}

/// # Errors
///
/// Returns `InvalidConfiguration` if the client id cannot be encoded
pub fn validate_client_id(client_id: &str) -> Result<()> {
    if !is_valid_client_id(client_id) {
        return Err(MqttError::InvalidConfiguration(format!(
            "invalid client id: {client_id:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_topic_names() {
        assert!(is_valid_topic_name("sport/tennis/player1"));
        assert!(is_valid_topic_name("/"));
        assert!(is_valid_topic_name("home/sensor temp"));
        assert!(is_valid_topic_name("日本"));
    }

    #[test]
    fn test_invalid_topic_names() {
        assert!(!is_valid_topic_name(""));
        assert!(!is_valid_topic_name("sport/+/player"));
        assert!(!is_valid_topic_name("sport/#"));
        assert!(!is_valid_topic_name("a\0b"));
        assert!(!is_valid_topic_name(&"a".repeat(70_000)));
    }

    #[test]
    fn test_valid_topic_filters() {
        for filter in ["#", "+", "sport/+/player", "sport/tennis/#", "+/+", "a/b"] {
            assert!(is_valid_topic_filter(filter), "{filter}");
        }
    }

    #[test]
    fn test_invalid_topic_filters() {
        for filter in ["", "sport/tennis#", "sport/#/ranking", "sport+", "a\0"] {
            assert!(!is_valid_topic_filter(filter), "{filter:?}");
        }
    }

    #[test]
    fn test_validate_topic_name_errors() {
        assert!(matches!(
            validate_topic_name(""),
            Err(MqttError::InvalidArgument(msg)) if msg.contains("empty")
        ));
        assert!(matches!(
            validate_topic_name("a/#"),
            Err(MqttError::InvalidArgument(_))
        ));
        assert!(validate_topic_name("a/b").is_ok());
    }

    #[test]
    fn test_client_id() {
        assert!(is_valid_client_id("01HQZX3Y8K2N4P6R8T0V2W4Y6A"));
        assert!(is_valid_client_id("device-42"));
        assert!(!is_valid_client_id("bad\0id"));
        assert!(validate_client_id("bad\0id").is_err());
    }
}
