//! Process-unique pagelet instance ids.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT: AtomicU64 = AtomicU64::new(1);

/// Identity of one pagelet instance, unique within the process.
///
/// Rendered as four dash-separated base-36 groups, e.g. `1-A-2S-3F`, which is
/// the form the client runtime uses to look fragments up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageletId(u64);

impl PageletId {
    /// Allocate the next id.
    pub fn next() -> Self {
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw sequence number.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PageletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.0;
        let groups = [n >> 48, (n >> 32) & 0xffff, (n >> 16) & 0xffff, n & 0xffff];
        let parts: Vec<String> = groups.iter().map(|g| base36(*g)).collect();
        write!(f, "{}", parts.join("-"))
    }
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
