//! Parsers for the text vendor tools print.

use std::collections::HashMap;

/// Split `key<sep>value` lines into a map. Keys and values are trimmed and
/// values lose one pair of surrounding double quotes. Lines without the
/// separator are ignored; on duplicate keys the first line wins.
pub fn key_values(text: &str, sep: char) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(sep) else {
            continue;
        };
        map.entry(key.trim().to_string())
            .or_insert_with(|| strip_quotes(value.trim()).to_string());
    }
    map
}

/// Remove a leading and a trailing `"` if present.
pub fn strip_quotes(value: &str) -> &str {
    let value = value.strip_prefix('"').unwrap_or(value);
    value.strip_suffix('"').unwrap_or(value)
}

/// EdgeRouter serials are the base MAC in bare hex; regroup them as
/// colon-separated octets.
pub fn serial_to_mac(serial: &str) -> Option<String> {
    let serial = serial.trim();
    if serial.len() != 12 || !serial.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let octets: Vec<&str> = (0..6).map(|i| &serial[i * 2..i * 2 + 2]).collect();
    Some(octets.join(":").to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_values_equals() {
        let text = "eth0.macaddr=78:8a:20:aa:bb:cc\nsystemid=e517\nnoise\n";
        let kv = key_values(text, '=');
        assert_eq!(kv["eth0.macaddr"], "78:8a:20:aa:bb:cc");
        assert_eq!(kv["systemid"], "e517");
        assert_eq!(kv.len(), 2);
    }

    #[test]
    fn test_key_values_colon_keeps_rest() {
        let text = "Version:      v1.10.11\nBuild ID:     5274269\nBuilt on:     12/04/19 10:00\nHW S/N:       788A20F1E2D3\n";
        let kv = key_values(text, ':');
        assert_eq!(kv["Version"], "v1.10.11");
        assert_eq!(kv["Built on"], "12/04/19 10:00");
        assert_eq!(kv["HW S/N"], "788A20F1E2D3");
    }

    #[test]
    fn test_quoted_values() {
        let kv = key_values("DEV_NAME=\"A820\"\nVENDOR_NAME=\"QTS\n", '=');
        assert_eq!(kv["DEV_NAME"], "A820");
        assert_eq!(kv["VENDOR_NAME"], "QTS");
        assert_eq!(strip_quotes("\"\""), "");
        assert_eq!(strip_quotes("plain"), "plain");
    }

    #[test]
    fn test_serial_to_mac() {
        assert_eq!(
            serial_to_mac("788A20F1E2D3").as_deref(),
            Some("78:8a:20:f1:e2:d3")
        );
        assert_eq!(serial_to_mac("788A20"), None);
        assert_eq!(serial_to_mac("788A20F1E2ZZ"), None);
    }
}
