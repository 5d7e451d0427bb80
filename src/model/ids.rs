use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::str::FromStr;
use uuid::Uuid;

/// Type-safe identifier wrapper. The phantom type parameter `T` prevents
/// mixing IDs from different entity types (e.g., Contact ID vs Cluster ID).
///
/// Ids are ordered by their UUID so they can key `BTreeMap`s and keep
/// every pass over the contact set deterministic.
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T> {
    pub value: Uuid,
    #[serde(skip)]
    _phantom: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(value: Uuid) -> Self {
        Self {
            value,
            _phantom: PhantomData,
        }
    }

    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }

    /// Parse from a UUID string. Accepts the `urn:uuid:` form used by
    /// vCard `UID` and `RELATED` values.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        let trimmed = s.trim();
        let bare = trimmed
            .get(..9)
            .filter(|prefix| prefix.eq_ignore_ascii_case("urn:uuid:"))
            .map(|_| &trimmed[9..])
            .unwrap_or(trimmed);
        Ok(Self::new(Uuid::parse_str(bare)?))
    }

    /// Builds an id from a fixed integer. Handy for fixtures that need
    /// stable, readable ordering.
    pub fn from_u128(n: u128) -> Self {
        Self::new(Uuid::from_u128(n))
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> FromStr for Id<T> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.value)
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Foo;

    #[test]
    fn generate_creates_unique_ids() {
        let id1 = Id::<Foo>::generate();
        let id2 = Id::<Foo>::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn parse_accepts_urn_form() {
        let id = Id::<Foo>::generate();
        let urn = format!("urn:uuid:{}", id.value);
        assert_eq!(Id::<Foo>::parse(&urn).unwrap(), id);
        assert_eq!(Id::<Foo>::parse(&urn.to_uppercase()).unwrap(), id);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Id::<Foo>::parse("not-a-uuid").is_err());
        assert!("urn:uuid:".parse::<Id<Foo>>().is_err());
    }

    #[test]
    fn ordering_follows_integer_value() {
        let low = Id::<Foo>::from_u128(1);
        let high = Id::<Foo>::from_u128(2);
        assert!(low < high);
    }

    #[test]
    fn serde_roundtrip() {
        let id = Id::<Foo>::generate();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: Id<Foo> = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }
}
