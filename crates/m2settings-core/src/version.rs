//! Server version parsing and range constraints
//!
//! Versions are compared structurally: the string is split into an ordered
//! sequence of numeric and qualifier items, and two versions are compared item
//! by item. Missing trailing items count as a zero / release marker, so `2.3`
//! and `2.3.0` are equal while `2.3-SNAPSHOT` sorts before `2.3`.
//!
//! Constraints use the familiar range syntax: `[2.3,)`, `(1.0,2.0]`, `[1.5]`,
//! unions like `[1,2),[3,)`, or a bare version which only matches itself.

use crate::client::ServerStatus;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing a version constraint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Empty version constraint")]
    EmptyConstraint,

    #[error("Unbalanced range in version constraint: {0}")]
    UnbalancedRange(String),

    #[error("Invalid range '{range}': {reason}")]
    InvalidRange { range: String, reason: &'static str },
}

/// Why a server was rejected by the compatibility gate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Incompatible {
    #[error("Unsupported server edition: {found} (requires {required})")]
    Edition { found: String, required: String },

    #[error("Unsupported server version: {version} (requires {constraint})")]
    Version {
        version: Version,
        constraint: VersionConstraint,
    },
}

impl Incompatible {
    /// Short machine-friendly reason: `edition` or `version`
    pub fn reason(&self) -> &'static str {
        match self {
            Incompatible::Edition { .. } => "edition",
            Incompatible::Version { .. } => "version",
        }
    }
}

/// A single component of a parsed version
#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    /// Digits with leading zeros stripped, compared by length then lexically
    Number(String),
    /// Lowercased alphabetic qualifier
    Qualifier(String),
    /// Anything that is neither numeric nor alphabetic
    Invalid(String),
}

impl Item {
    fn parse(segment: &str) -> Self {
        if segment.is_empty() {
            return Item::Number(String::new());
        }
        if segment.chars().all(|c| c.is_ascii_digit()) {
            return Item::Number(segment.trim_start_matches('0').to_string());
        }
        if segment.chars().all(|c| c.is_alphabetic()) {
            return Item::Qualifier(segment.to_lowercase());
        }
        Item::Invalid(segment.to_string())
    }

    fn is_padding(&self) -> bool {
        match self {
            Item::Number(digits) => digits.is_empty(),
            Item::Qualifier(q) => qualifier_rank(q) == Some(0),
            Item::Invalid(_) => false,
        }
    }
}

/// Ordering rank of well-known qualifiers relative to a plain release (0)
fn qualifier_rank(qualifier: &str) -> Option<i8> {
    match qualifier {
        "alpha" | "a" => Some(-5),
        "beta" | "b" => Some(-4),
        "milestone" | "m" => Some(-3),
        "rc" | "cr" => Some(-2),
        "snapshot" => Some(-1),
        "" | "ga" | "final" | "release" => Some(0),
        "sp" => Some(1),
        _ => None,
    }
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_qualifiers(a: &str, b: &str) -> Ordering {
    match (qualifier_rank(a), qualifier_rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn compare_items(a: &Item, b: &Item) -> Ordering {
    match (a, b) {
        (Item::Number(x), Item::Number(y)) => compare_numbers(x, y),
        (Item::Qualifier(x), Item::Qualifier(y)) => compare_qualifiers(x, y),
        (Item::Invalid(x), Item::Invalid(y)) => x.cmp(y),
        // Unparseable segments rank below everything in their position
        (Item::Invalid(_), _) => Ordering::Less,
        (_, Item::Invalid(_)) => Ordering::Greater,
        (Item::Number(_), Item::Qualifier(_)) => Ordering::Greater,
        (Item::Qualifier(_), Item::Number(_)) => Ordering::Less,
    }
}

/// Compare an item against the implicit padding of a shorter version
fn compare_to_padding(item: &Item) -> Ordering {
    match item {
        Item::Number(digits) if digits.is_empty() => Ordering::Equal,
        Item::Number(_) => Ordering::Greater,
        Item::Qualifier(q) => compare_qualifiers(q, ""),
        Item::Invalid(_) => Ordering::Less,
    }
}

/// A structurally comparable version
///
/// Parsing never fails; malformed input still yields a version that can be
/// compared and reported.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    items: Vec<Item>,
}

impl Version {
    /// Parse a version string
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let mut items = Vec::new();
        let mut current = String::new();
        let mut previous: Option<char> = None;

        for c in trimmed.chars() {
            if matches!(c, '.' | '-' | '_') {
                items.push(Item::parse(&current));
                current.clear();
                previous = None;
                continue;
            }
            // Transitions between digits and letters start a new item: 1alpha2 -> 1, alpha, 2
            if let Some(prev) = previous {
                let switched = (prev.is_ascii_digit() && c.is_alphabetic())
                    || (prev.is_alphabetic() && c.is_ascii_digit());
                if switched {
                    items.push(Item::parse(&current));
                    current.clear();
                }
            }
            current.push(c);
            previous = Some(c);
        }
        if !current.is_empty() || !items.is_empty() {
            items.push(Item::parse(&current));
        }

        while items.last().is_some_and(Item::is_padding) {
            items.pop();
        }

        Self {
            raw: trimmed.to_string(),
            items,
        }
    }

    /// The version as originally given (whitespace trimmed)
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Human-readable rendering of the parsed items, used in diagnostics
    pub fn describe(&self) -> String {
        let parts: Vec<String> = self
            .items
            .iter()
            .map(|item| match item {
                Item::Number(d) if d.is_empty() => "0".to_string(),
                Item::Number(d) => d.clone(),
                Item::Qualifier(q) => q.clone(),
                Item::Invalid(s) => format!("<{}>", s),
            })
            .collect();
        format!("[{}]", parts.join(", "))
    }
}

impl FromStr for Version {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Version::parse(s))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.items.len().max(other.items.len());
        for i in 0..len {
            let ordering = match (self.items.get(i), other.items.get(i)) {
                (Some(a), Some(b)) => compare_items(a, b),
                (Some(a), None) => compare_to_padding(a),
                (None, Some(b)) => compare_to_padding(b).reverse(),
                (None, None) => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// One end of a version range
#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    version: Version,
    inclusive: bool,
}

/// A contiguous range of versions; a missing bound is unbounded
#[derive(Debug, Clone, PartialEq, Eq)]
struct VersionRange {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

impl VersionRange {
    fn parse(text: &str) -> Result<Self, VersionError> {
        let invalid = |reason| VersionError::InvalidRange {
            range: text.to_string(),
            reason,
        };

        let lower_inclusive = match text.chars().next() {
            Some('[') => true,
            Some('(') => false,
            _ => return Err(invalid("must start with '[' or '('")),
        };
        let upper_inclusive = match text.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(invalid("must end with ']' or ')'")),
        };
        if text.len() < 2 {
            return Err(invalid("range is empty"));
        }
        let body = text[1..text.len() - 1].trim();

        let Some((low, high)) = body.split_once(',') else {
            // Exact version: [1.5]
            if !(lower_inclusive && upper_inclusive) || body.is_empty() {
                return Err(invalid("single version ranges must be written as [version]"));
            }
            let bound = Bound {
                version: Version::parse(body),
                inclusive: true,
            };
            return Ok(Self {
                lower: Some(bound.clone()),
                upper: Some(bound),
            });
        };

        if high.contains(',') {
            return Err(invalid("too many commas"));
        }

        let (low, high) = (low.trim(), high.trim());
        let lower = (!low.is_empty()).then(|| Bound {
            version: Version::parse(low),
            inclusive: lower_inclusive,
        });
        let upper = (!high.is_empty()).then(|| Bound {
            version: Version::parse(high),
            inclusive: upper_inclusive,
        });

        if let (Some(l), Some(u)) = (&lower, &upper) {
            if l.version > u.version {
                return Err(invalid("lower bound is greater than upper bound"));
            }
        }

        Ok(Self { lower, upper })
    }

    fn contains(&self, version: &Version) -> bool {
        let above = match &self.lower {
            Some(b) if b.inclusive => *version >= b.version,
            Some(b) => *version > b.version,
            None => true,
        };
        let below = match &self.upper {
            Some(b) if b.inclusive => *version <= b.version,
            Some(b) => *version < b.version,
            None => true,
        };
        above && below
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(l), Some(u)) = (&self.lower, &self.upper) {
            if l.inclusive && u.inclusive && l.version.as_str() == u.version.as_str() {
                return write!(f, "[{}]", l.version);
            }
        }
        match &self.lower {
            Some(b) => write!(f, "{}{}", if b.inclusive { '[' } else { '(' }, b.version)?,
            None => f.write_str("(")?,
        }
        f.write_str(",")?;
        match &self.upper {
            Some(b) => write!(f, "{}{}", b.version, if b.inclusive { ']' } else { ')' }),
            None => f.write_str(")"),
        }
    }
}

/// A version constraint: a union of ranges, or a single exact version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    ranges: Vec<VersionRange>,
    exact: Option<Version>,
}

impl VersionConstraint {
    /// Parse a constraint expression such as `[2.3,)`
    pub fn parse(expr: &str) -> Result<Self, VersionError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(VersionError::EmptyConstraint);
        }

        if !expr.starts_with('[') && !expr.starts_with('(') {
            return Ok(Self {
                ranges: Vec::new(),
                exact: Some(Version::parse(expr)),
            });
        }

        let mut ranges = Vec::new();
        let mut rest = expr;
        while !rest.is_empty() {
            let close = rest
                .find([']', ')'])
                .ok_or_else(|| VersionError::UnbalancedRange(expr.to_string()))?;
            let (range, tail) = rest.split_at(close + 1);
            if !range.starts_with(['[', '(']) || range[1..].contains(['[', '(']) {
                return Err(VersionError::UnbalancedRange(expr.to_string()));
            }
            ranges.push(VersionRange::parse(range)?);

            rest = tail.trim_start();
            if let Some(stripped) = rest.strip_prefix(',') {
                rest = stripped.trim_start();
                if rest.is_empty() {
                    return Err(VersionError::UnbalancedRange(expr.to_string()));
                }
            } else if !rest.is_empty() {
                return Err(VersionError::UnbalancedRange(expr.to_string()));
            }
        }

        Ok(Self {
            ranges,
            exact: None,
        })
    }

    /// Whether the constraint admits the given version
    pub fn contains(&self, version: &Version) -> bool {
        match &self.exact {
            Some(exact) => exact == version,
            None => self.ranges.iter().any(|r| r.contains(version)),
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionConstraint::parse(s)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(exact) = &self.exact {
            return write!(f, "{}", exact);
        }
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", range)?;
        }
        Ok(())
    }
}

/// Require the server to be the expected edition within the version constraint
pub fn check_compatible(
    status: &ServerStatus,
    required_edition: &str,
    constraint: &VersionConstraint,
) -> Result<(), Incompatible> {
    log::debug!("Ensuring compatibility: {:?}", status);

    if status.edition != required_edition {
        return Err(Incompatible::Edition {
            found: status.edition.clone(),
            required: required_edition.to_string(),
        });
    }

    let version = Version::parse(&status.version);
    log::debug!("Version: {} {}", version, version.describe());

    if !constraint.contains(&version) {
        log::error!("Incompatible server version detected");
        log::error!("Raw version: {}", status.version);
        log::error!("Detected version: {}", version.describe());
        log::error!("Compatible version constraint: {}", constraint);
        return Err(Incompatible::Version {
            version,
            constraint: constraint.clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s)
    }

    fn status(edition: &str, version: &str) -> ServerStatus {
        ServerStatus {
            app_name: "Nexus Repository Manager".to_string(),
            edition: edition.to_string(),
            version: version.to_string(),
        }
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(v("2.2.9") < v("2.3"));
        assert!(v("2.10") > v("2.9"));
        assert!(v("10.0") > v("9.99.99"));
    }

    #[test]
    fn test_trailing_zeros_are_equal() {
        assert_eq!(v("2.3"), v("2.3.0"));
        assert_eq!(v("2.3.0.0"), v("2.3"));
        assert_eq!(v("2.03"), v("2.3"));
    }

    #[test]
    fn test_qualifier_ordering() {
        assert!(v("2.3-SNAPSHOT") < v("2.3"));
        assert!(v("2.3-alpha") < v("2.3-beta"));
        assert!(v("2.3-rc1") < v("2.3"));
        assert!(v("2.3-sp1") > v("2.3"));
        assert!(v("2.3.0-01") > v("2.3"));
        assert_eq!(v("2.3-final"), v("2.3"));
    }

    #[test]
    fn test_unknown_qualifiers_compare_lexically() {
        assert!(v("1.0-foo") < v("1.0-goo"));
        assert!(v("1.0-foo") > v("1.0-sp"));
    }

    #[test]
    fn test_malformed_segments_rank_lowest() {
        assert!(v("2.#") < v("2.0"));
        assert!(v("2.#") < v("2.alpha"));
        assert!(v("") < v("0.1"));
        assert!(v("garbage!") < v("1"));
    }

    #[test]
    fn test_lower_bound_constraint() {
        let c = VersionConstraint::parse("[2.3,)").unwrap();
        assert!(c.contains(&v("2.3")));
        assert!(c.contains(&v("2.3.0-01")));
        assert!(c.contains(&v("3.0")));
        assert!(!c.contains(&v("2.2.9")));
        assert!(!c.contains(&v("2.3-SNAPSHOT")));
    }

    #[test]
    fn test_bounded_and_exclusive_ranges() {
        let c = VersionConstraint::parse("(1.0,2.0]").unwrap();
        assert!(!c.contains(&v("1.0")));
        assert!(c.contains(&v("1.5")));
        assert!(c.contains(&v("2.0")));
        assert!(!c.contains(&v("2.0.1")));

        let upper = VersionConstraint::parse("(,2.0)").unwrap();
        assert!(upper.contains(&v("0.1")));
        assert!(!upper.contains(&v("2.0")));
    }

    #[test]
    fn test_exact_and_union_constraints() {
        let exact = VersionConstraint::parse("[1.5]").unwrap();
        assert!(exact.contains(&v("1.5.0")));
        assert!(!exact.contains(&v("1.6")));

        let union = VersionConstraint::parse("[1,2),[3,)").unwrap();
        assert!(union.contains(&v("1.9")));
        assert!(!union.contains(&v("2.5")));
        assert!(union.contains(&v("3.1")));

        let bare = VersionConstraint::parse("2.3").unwrap();
        assert!(bare.contains(&v("2.3.0")));
        assert!(!bare.contains(&v("2.4")));
    }

    #[test]
    fn test_constraint_display_round_trips() {
        for expr in ["[2.3,)", "(1.0,2.0]", "[1.5]", "[1,2),[3,)", "(,2.0)"] {
            assert_eq!(VersionConstraint::parse(expr).unwrap().to_string(), expr);
        }
    }

    #[test]
    fn test_invalid_constraints() {
        assert_eq!(
            VersionConstraint::parse("  "),
            Err(VersionError::EmptyConstraint)
        );
        assert!(VersionConstraint::parse("[2.3,").is_err());
        assert!(VersionConstraint::parse("[3,2]").is_err());
        assert!(VersionConstraint::parse("[1,2,3]").is_err());
        assert!(VersionConstraint::parse("(1.5)").is_err());
        assert_eq!(
            VersionConstraint::parse("[1,2),é)"),
            Err(VersionError::UnbalancedRange("[1,2),é)".to_string()))
        );
        assert!(VersionConstraint::parse("[é,)").is_ok());
    }

    #[test]
    fn test_check_compatible_passes() {
        let c = VersionConstraint::parse("[2.3,)").unwrap();
        assert!(check_compatible(&status("PRO", "2.5"), "PRO", &c).is_ok());
        assert!(check_compatible(&status("PRO", "2.3.0-01"), "PRO", &c).is_ok());
    }

    #[test]
    fn test_check_compatible_rejects_edition() {
        let c = VersionConstraint::parse("[2.3,)").unwrap();
        let err = check_compatible(&status("OSS", "2.5"), "PRO", &c).unwrap_err();
        assert_eq!(err.reason(), "edition");

        // Edition match is case-sensitive
        let err = check_compatible(&status("pro", "2.5"), "PRO", &c).unwrap_err();
        assert_eq!(err.reason(), "edition");
    }

    #[test]
    fn test_check_compatible_rejects_version() {
        let c = VersionConstraint::parse("[2.3,)").unwrap();
        let err = check_compatible(&status("PRO", "2.2.9"), "PRO", &c).unwrap_err();
        assert_eq!(err.reason(), "version");
        assert!(err.to_string().contains("2.2.9"));
        assert!(err.to_string().contains("[2.3,)"));
    }

    #[test]
    fn test_malformed_server_version_is_reported() {
        let c = VersionConstraint::parse("[2.3,)").unwrap();
        let err = check_compatible(&status("PRO", "unknown"), "PRO", &c).unwrap_err();
        assert_eq!(err.reason(), "version");
    }
}
