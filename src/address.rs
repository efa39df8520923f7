//! Device address format shared by the CLI and the bridge facade.

use regex::Regex;
use std::sync::OnceLock;

static ADDRESS_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn address_regex() -> Option<&'static Regex> {
    ADDRESS_RE
        .get_or_init(|| Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").ok())
        .as_ref()
}

/// True when `address` is six colon-separated hex pairs, e.g. `AA:BB:CC:DD:EE:FF`.
pub fn is_valid_device_address(address: &str) -> bool {
    address_regex().is_some_and(|re| re.is_match(address))
}
