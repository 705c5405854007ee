//! Capacity-checked text building.
//!
//! Decoded SMS bodies and reassembled messages have hard byte limits. Instead of
//! silently clipping, [`BoundedText`] checks the remaining capacity before every
//! append and remembers whether anything had to be dropped, so callers can log
//! (and tests can assert) truncation.

/// Growable UTF-8 buffer with a fixed upper bound in bytes.
#[derive(Debug, Clone, Default)]
pub struct BoundedText {
    buf: String,
    capacity: usize,
    truncated: bool,
}

impl BoundedText {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: String::new(), capacity, truncated: false }
    }

    /// Append a char; returns false (and flags truncation) when it does not fit.
    pub fn push(&mut self, c: char) -> bool {
        if self.buf.len() + c.len_utf8() > self.capacity {
            self.truncated = true;
            return false;
        }
        self.buf.push(c);
        true
    }

    /// Append as much of `s` as fits, never splitting a char.
    /// Returns true when the whole string was taken.
    pub fn push_str(&mut self, s: &str) -> bool {
        let room = self.capacity.saturating_sub(self.buf.len());
        if s.len() <= room {
            self.buf.push_str(s);
            return true;
        }
        let mut cut = room;
        while !s.is_char_boundary(cut) { cut -= 1; }
        self.buf.push_str(&s[..cut]);
        self.truncated = true;
        false
    }

    pub fn is_truncated(&self) -> bool { self.truncated }

    pub fn len(&self) -> usize { self.buf.len() }

    pub fn is_empty(&self) -> bool { self.buf.is_empty() }

    pub fn as_str(&self) -> &str { &self.buf }

    pub fn into_string(self) -> String { self.buf }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_str_stops_on_char_boundary() {
        let mut t = BoundedText::with_capacity(4);
        assert!(t.push_str("ab"));
        // "é" is two bytes, "漢" three: only the first fits
        assert!(!t.push_str("é漢"));
        assert_eq!(t.as_str(), "abé");
        assert!(t.is_truncated());
    }

    #[test]
    fn push_rejects_when_full() {
        let mut t = BoundedText::with_capacity(1);
        assert!(t.push('x'));
        assert!(!t.push('y'));
        assert_eq!(t.len(), 1);
        assert!(t.is_truncated());
    }
}
