use std::fmt;
use std::str::FromStr;

pub const FINGERPRINT_LEN: usize = 16;

/// 128-bit content fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub [u8; FINGERPRINT_LEN]);

impl Fingerprint {
    pub fn from_u128_le(value: u128) -> Self {
        Fingerprint(value.to_le_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Lowercase hex, always 32 chars.
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFingerprintError(String);

impl fmt::Display for ParseFingerprintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid fingerprint '{}'", self.0)
    }
}

impl std::error::Error for ParseFingerprintError {}

impl FromStr for Fingerprint {
    type Err = ParseFingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseFingerprintError(s.to_string());
        if s.len() != FINGERPRINT_LEN * 2 || !s.is_ascii() {
            return Err(err());
        }
        let mut bytes = [0u8; FINGERPRINT_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
        }
        Ok(Fingerprint(bytes))
    }
}

/// What we know about a file's content.
///
/// Equality is deliberately conservative: two identities match only when
/// both carry a full fingerprint and those match, or when both carry only a
/// partial fingerprint and those match. Mixed evidence never matches, and
/// neither does an identity with no fingerprint at all, which is why this
/// type is `PartialEq` but not `Eq`. Use [`ContentIdentity::key`] for maps.
#[derive(Debug, Clone, Default)]
pub struct ContentIdentity {
    pub size: u64,
    pub partial: Option<Fingerprint>,
    pub full: Option<Fingerprint>,
}

/// Hashable form of an identity; two keys are equal exactly when the
/// identities they came from are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Full(u64, Fingerprint),
    Partial(u64, Fingerprint),
}

impl ContentIdentity {
    pub fn full(size: u64, fingerprint: Fingerprint) -> Self {
        Self {
            size,
            partial: None,
            full: Some(fingerprint),
        }
    }

    pub fn partial(size: u64, fingerprint: Fingerprint) -> Self {
        Self {
            size,
            partial: Some(fingerprint),
            full: None,
        }
    }

    pub fn has_full(&self) -> bool {
        self.full.is_some()
    }

    pub fn has_partial(&self) -> bool {
        self.partial.is_some()
    }

    pub fn key(&self) -> Option<IdentityKey> {
        match (self.full, self.partial) {
            (Some(full), _) => Some(IdentityKey::Full(self.size, full)),
            (None, Some(partial)) => Some(IdentityKey::Partial(self.size, partial)),
            (None, None) => None,
        }
    }

    /// The strongest fingerprint available, full before partial.
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.full.or(self.partial)
    }

    pub fn hex(&self) -> Option<String> {
        self.fingerprint().map(|f| f.to_hex())
    }
}

impl PartialEq for ContentIdentity {
    fn eq(&self, other: &Self) -> bool {
        if self.size != other.size {
            return false;
        }
        match (self.full, other.full) {
            (Some(a), Some(b)) => a == b,
            (None, None) => matches!((self.partial, other.partial), (Some(a), Some(b)) if a == b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(byte: u8) -> Fingerprint {
        Fingerprint([byte; FINGERPRINT_LEN])
    }

    #[test]
    fn full_fingerprints_compare_by_bytes() {
        assert_eq!(ContentIdentity::full(3, fp(1)), ContentIdentity::full(3, fp(1)));
        assert_ne!(ContentIdentity::full(3, fp(1)), ContentIdentity::full(3, fp(2)));
    }

    #[test]
    fn partial_only_identities_compare_partials() {
        assert_eq!(ContentIdentity::partial(9, fp(7)), ContentIdentity::partial(9, fp(7)));
        assert_ne!(ContentIdentity::partial(9, fp(7)), ContentIdentity::partial(9, fp(8)));
    }

    #[test]
    fn mixed_evidence_never_matches() {
        let full = ContentIdentity::full(5, fp(1));
        let partial = ContentIdentity::partial(5, fp(1));
        assert_ne!(full, partial);
        assert_ne!(partial, full);
        assert_ne!(full.key(), partial.key());

        // full + partial against partial-only still counts as mixed
        let both = ContentIdentity {
            size: 5,
            partial: Some(fp(1)),
            full: Some(fp(2)),
        };
        assert_ne!(both, partial);
    }

    #[test]
    fn empty_identity_is_not_equal_to_itself() {
        let empty = ContentIdentity::default();
        assert_ne!(empty, empty.clone());
        assert!(empty.key().is_none());
    }

    #[test]
    fn size_mismatch_is_never_equal() {
        assert_ne!(ContentIdentity::full(1, fp(1)), ContentIdentity::full(2, fp(1)));
    }

    #[test]
    fn hex_round_trips_and_stays_lowercase() {
        let f = Fingerprint::from_u128_le(0x0123_4567_89ab_cdef_0011_2233_4455_6677);
        let hex = f.to_hex();
        assert_eq!(hex.len(), 32);
        assert_eq!(hex, hex.to_lowercase());
        // little-endian: low byte first
        assert!(hex.starts_with("77665544"));
        assert_eq!(hex.parse::<Fingerprint>().unwrap(), f);
        assert!("xyz".parse::<Fingerprint>().is_err());
    }
}
