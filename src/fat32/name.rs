//! Conversion between user supplied names and the fixed width 8.3 names
//! stored in directory entries.

use arrayvec::ArrayString;

/// A decoded 8.3 name such as `README.TXT`. Eight name characters, a dot and
/// three extension characters fit exactly.
pub type FileName = ArrayString<12>;

/// Name as stored on disk: eight characters of name and three of extension,
/// upper case and padded with spaces.
#[derive(Copy, Clone, PartialEq, Eq)]
pub(crate) struct ShortName(pub(crate) [u8; 11]);

impl ShortName {
    const NAME_LEN: usize = 8;
    const EXT_LEN: usize = 3;
    const PADDING: u8 = b' ';

    /// Converts `name` to 8.3 form: upper case, split at the last dot, each
    /// part truncated, characters FAT does not allow replaced by `_`.
    ///
    /// Returns `None` when there is nothing left to store as the name part.
    pub(crate) fn encode(name: &str) -> Option<Self> {
        let (base, ext) = match name.rfind('.') {
            Some(i) => (&name[..i], &name[i + 1..]),
            None => (name, ""),
        };
        if base.is_empty() {
            return None;
        }

        let mut bytes = [Self::PADDING; 11];
        for (slot, c) in bytes[..Self::NAME_LEN].iter_mut().zip(base.chars()) {
            *slot = encode_char(c);
        }
        for (slot, c) in bytes[Self::NAME_LEN..].iter_mut().zip(ext.chars()) {
            *slot = encode_char(c);
        }
        Some(Self(bytes))
    }

    /// Converts back to `NAME.EXT`, trimming the padding of each part. The
    /// dot is only present when there is an extension.
    pub(crate) fn decode(&self) -> FileName {
        let (base, ext) = self.0.split_at(Self::NAME_LEN);
        let mut name = FileName::new();
        for &b in trim_padding(base) {
            name.push(decode_byte(b));
        }
        let ext = trim_padding(ext);
        if !ext.is_empty() {
            name.push('.');
            for &b in ext {
                name.push(decode_byte(b));
            }
        }
        debug_assert!(name.len() <= Self::NAME_LEN + 1 + Self::EXT_LEN);
        name
    }
}

impl core::fmt::Debug for ShortName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("ShortName").field(&self.decode().as_str()).finish()
    }
}

/// Compares a decoded entry name against a user supplied name, after putting
/// the latter through the same 8.3 conversion.
///
/// `.` and `..` cannot be encoded, so an exact (case insensitive) match is
/// accepted as well.
pub(crate) fn names_match(entry: &str, query: &str) -> bool {
    if query.is_empty() {
        return false;
    }
    entry.eq_ignore_ascii_case(query)
        || ShortName::encode(query).is_some_and(|short| short.decode().as_str() == entry)
}

fn encode_char(c: char) -> u8 {
    const ALLOWED_SYMBOLS: &[u8] = b"!#$%&'()-@^_`{}~";
    match u8::try_from(c) {
        Ok(b) if b.is_ascii_alphanumeric() || ALLOWED_SYMBOLS.contains(&b) => {
            b.to_ascii_uppercase()
        }
        _ => b'_',
    }
}

fn decode_byte(b: u8) -> char {
    // Keep the decoded name ASCII so it always fits in twelve bytes.
    if b.is_ascii_graphic() || b == b' ' {
        char::from(b)
    } else {
        '?'
    }
}

fn trim_padding(part: &[u8]) -> &[u8] {
    let end = part
        .iter()
        .rposition(|&b| b != ShortName::PADDING)
        .map_or(0, |i| i + 1);
    &part[..end]
}
