//! Vendor-prefix capability probing.
//!
//! Hosts have historically shipped the resource timing members under vendor
//! prefixes (`webkitClearResourceTimings`, `msSetResourceTimingBufferSize`,
//! ...). Every call into a host goes through [`lookup`] so a missing member is
//! reported as `None` instead of failing.

use std::collections::HashSet;

/// Vendor prefixes probed after the unprefixed name, in preference order.
pub const VENDOR_PREFIXES: [&str; 3] = ["webkit", "ms", "moz"];

/// A table of member names a host exposes.
pub trait CapabilityTable {
    /// Whether a member with exactly this name exists.
    fn has_member(&self, name: &str) -> bool;
}

impl CapabilityTable for HashSet<String> {
    fn has_member(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl CapabilityTable for [&str] {
    fn has_member(&self, name: &str) -> bool {
        self.iter().any(|member| *member == name)
    }
}

/// Build the vendor-prefixed form of a member name (`webkit` + `ClearResourceTimings`).
pub fn prefixed(prefix: &str, name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => {
            let mut out = String::with_capacity(prefix.len() + name.len());
            out.push_str(prefix);
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
            out
        }
        None => prefix.to_string(),
    }
}

/// All candidate spellings of `name`, in the order they are probed.
pub fn candidates(name: &str) -> Vec<String> {
    std::iter::once(name.to_string())
        .chain(VENDOR_PREFIXES.iter().map(|prefix| prefixed(prefix, name)))
        .collect()
}

/// Find the first spelling of `name` the table exposes.
pub fn lookup<T: CapabilityTable + ?Sized>(table: &T, name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    candidates(name)
        .into_iter()
        .find(|candidate| table.has_member(candidate))
}
