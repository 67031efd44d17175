//! Built-in XML Schema simple types
//!
//! Lexical checks for the supported built-in datatypes, whitespace
//! normalization and value ordering for range facets.

use std::borrow::Cow;
use std::cmp::Ordering;

use crate::core::qname::{is_name, is_name_char, is_ncname};

/// `whiteSpace` facet value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    Preserve,
    Replace,
    Collapse,
}

impl WhiteSpace {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "preserve" => Some(WhiteSpace::Preserve),
            "replace" => Some(WhiteSpace::Replace),
            "collapse" => Some(WhiteSpace::Collapse),
            _ => None,
        }
    }

    /// Normalize a value
    pub fn apply(self, value: &str) -> Cow<'_, str> {
        match self {
            WhiteSpace::Preserve => Cow::Borrowed(value),
            WhiteSpace::Replace => {
                if value.contains(['\t', '\n', '\r']) {
                    Cow::Owned(value.replace(['\t', '\n', '\r'], " "))
                } else {
                    Cow::Borrowed(value)
                }
            }
            WhiteSpace::Collapse => {
                let collapsed = value.split_ascii_whitespace().collect::<Vec<_>>().join(" ");
                if collapsed == value {
                    Cow::Borrowed(value)
                } else {
                    Cow::Owned(collapsed)
                }
            }
        }
    }
}

/// How values of a type are ordered for `min*`/`max*` facets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Numeric,
    Temporal,
    Unordered,
}

macro_rules! builtins {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Supported built-in simple types
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Builtin {
            $($variant),*
        }

        impl Builtin {
            /// All supported built-ins
            pub const ALL: &'static [Builtin] = &[$(Builtin::$variant),*];

            /// Look up by local name in the XML Schema namespace
            pub fn from_local(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Builtin::$variant),)*
                    _ => None,
                }
            }

            /// Local name in the XML Schema namespace
            pub fn name(self) -> &'static str {
                match self {
                    $(Builtin::$variant => $name),*
                }
            }
        }
    };
}

builtins! {
    AnySimpleType => "anySimpleType",
    String => "string",
    NormalizedString => "normalizedString",
    Token => "token",
    Language => "language",
    Name => "Name",
    NCName => "NCName",
    Id => "ID",
    IdRef => "IDREF",
    IdRefs => "IDREFS",
    NmToken => "NMTOKEN",
    NmTokens => "NMTOKENS",
    AnyUri => "anyURI",
    QName => "QName",
    Boolean => "boolean",
    Decimal => "decimal",
    Integer => "integer",
    NonPositiveInteger => "nonPositiveInteger",
    NegativeInteger => "negativeInteger",
    NonNegativeInteger => "nonNegativeInteger",
    PositiveInteger => "positiveInteger",
    Long => "long",
    Int => "int",
    Short => "short",
    Byte => "byte",
    UnsignedLong => "unsignedLong",
    UnsignedInt => "unsignedInt",
    UnsignedShort => "unsignedShort",
    UnsignedByte => "unsignedByte",
    Float => "float",
    Double => "double",
    Date => "date",
    DateTime => "dateTime",
    Time => "time",
    GYear => "gYear",
    Duration => "duration",
    HexBinary => "hexBinary",
    Base64Binary => "base64Binary",
}

impl Builtin {
    /// Default whitespace handling
    pub fn whitespace(self) -> WhiteSpace {
        match self {
            Builtin::String | Builtin::AnySimpleType => WhiteSpace::Preserve,
            Builtin::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    pub fn order_kind(self) -> OrderKind {
        match self {
            Builtin::Decimal
            | Builtin::Integer
            | Builtin::NonPositiveInteger
            | Builtin::NegativeInteger
            | Builtin::NonNegativeInteger
            | Builtin::PositiveInteger
            | Builtin::Long
            | Builtin::Int
            | Builtin::Short
            | Builtin::Byte
            | Builtin::UnsignedLong
            | Builtin::UnsignedInt
            | Builtin::UnsignedShort
            | Builtin::UnsignedByte
            | Builtin::Float
            | Builtin::Double => OrderKind::Numeric,
            Builtin::Date | Builtin::DateTime | Builtin::Time | Builtin::GYear => OrderKind::Temporal,
            _ => OrderKind::Unordered,
        }
    }

    /// Length as measured by the `length` facets
    pub fn length_of(self, value: &str) -> usize {
        match self {
            Builtin::HexBinary => value.len() / 2,
            Builtin::Base64Binary => {
                let data: Vec<u8> = value.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
                let padding = data.iter().rev().take_while(|&&b| b == b'=').count();
                ((data.len() / 4) * 3).saturating_sub(padding.min(2))
            }
            Builtin::IdRefs | Builtin::NmTokens => value.split_ascii_whitespace().count(),
            _ => value.chars().count(),
        }
    }

    /// Compare two values of this type; `None` when unordered or unparseable
    pub fn compare(self, a: &str, b: &str) -> Option<Ordering> {
        match self.order_kind() {
            OrderKind::Numeric => parse_number(a)?.partial_cmp(&parse_number(b)?),
            OrderKind::Temporal => Some(a.cmp(b)),
            OrderKind::Unordered => None,
        }
    }

    /// Value equality used by `enumeration`
    pub fn equal(self, a: &str, b: &str) -> bool {
        match self.order_kind() {
            OrderKind::Numeric => self.compare(a, b) == Some(Ordering::Equal),
            _ => a == b,
        }
    }

    /// Check the lexical form of an already whitespace-normalized value
    pub fn check(self, value: &str) -> Result<(), String> {
        let ok = match self {
            Builtin::AnySimpleType
            | Builtin::String
            | Builtin::NormalizedString
            | Builtin::Token
            | Builtin::AnyUri => true,
            Builtin::Language => is_language(value),
            Builtin::Name => is_name(value),
            Builtin::NCName | Builtin::Id | Builtin::IdRef => is_ncname(value),
            Builtin::IdRefs => !value.is_empty() && value.split(' ').all(is_ncname),
            Builtin::NmToken => is_nmtoken(value),
            Builtin::NmTokens => !value.is_empty() && value.split(' ').all(is_nmtoken),
            Builtin::QName => match value.split_once(':') {
                Some((prefix, local)) => is_ncname(prefix) && is_ncname(local),
                None => is_ncname(value),
            },
            Builtin::Boolean => matches!(value, "true" | "false" | "1" | "0"),
            Builtin::Decimal => is_decimal(value),
            Builtin::Float | Builtin::Double => is_float(value),
            Builtin::Date => is_date(value),
            Builtin::DateTime => is_date_time(value),
            Builtin::Time => is_time(value),
            Builtin::GYear => is_gyear(value),
            Builtin::Duration => is_duration(value),
            Builtin::HexBinary => value.len() % 2 == 0 && value.bytes().all(|b| b.is_ascii_hexdigit()),
            Builtin::Base64Binary => is_base64(value),
            Builtin::Integer
            | Builtin::NonPositiveInteger
            | Builtin::NegativeInteger
            | Builtin::NonNegativeInteger
            | Builtin::PositiveInteger
            | Builtin::Long
            | Builtin::Int
            | Builtin::Short
            | Builtin::Byte
            | Builtin::UnsignedLong
            | Builtin::UnsignedInt
            | Builtin::UnsignedShort
            | Builtin::UnsignedByte => return self.check_integer(value),
        };
        if ok {
            Ok(())
        } else {
            Err(format!("'{}' is not a valid value of type xs:{}", value, self.name()))
        }
    }

    fn check_integer(self, value: &str) -> Result<(), String> {
        let invalid = || format!("'{}' is not a valid value of type xs:{}", value, self.name());
        let digits = value.strip_prefix(['+', '-']).unwrap_or(value);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let negative = value.starts_with('-') && digits.bytes().any(|b| b != b'0');
        let positive = !negative && digits.bytes().any(|b| b != b'0');

        let (min, max): (i128, i128) = match self {
            Builtin::Long => (i64::MIN as i128, i64::MAX as i128),
            Builtin::Int => (i32::MIN as i128, i32::MAX as i128),
            Builtin::Short => (i16::MIN as i128, i16::MAX as i128),
            Builtin::Byte => (i8::MIN as i128, i8::MAX as i128),
            Builtin::UnsignedLong => (0, u64::MAX as i128),
            Builtin::UnsignedInt => (0, u32::MAX as i128),
            Builtin::UnsignedShort => (0, u16::MAX as i128),
            Builtin::UnsignedByte => (0, u8::MAX as i128),
            Builtin::NonPositiveInteger => return if positive { Err(invalid()) } else { Ok(()) },
            Builtin::NegativeInteger => return if negative { Ok(()) } else { Err(invalid()) },
            Builtin::NonNegativeInteger => return if negative { Err(invalid()) } else { Ok(()) },
            Builtin::PositiveInteger => return if positive { Ok(()) } else { Err(invalid()) },
            _ => return Ok(()),
        };
        let parsed: i128 = value.parse().map_err(|_| invalid())?;
        if parsed < min || parsed > max {
            return Err(invalid());
        }
        Ok(())
    }
}

/// Numeric value for ordering; INF and NaN follow float semantics
fn parse_number(value: &str) -> Option<f64> {
    match value {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ if is_float(value) => value.parse().ok(),
        _ => None,
    }
}

fn is_nmtoken(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_name_char)
}

fn is_language(s: &str) -> bool {
    let mut parts = s.split('-');
    let first = parts.next().unwrap_or("");
    let alpha = |p: &str| (1..=8).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_alphabetic());
    let alnum = |p: &str| (1..=8).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_alphanumeric());
    alpha(first) && parts.all(alnum)
}

fn is_decimal(s: &str) -> bool {
    let body = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (int, frac) = body.split_once('.').unwrap_or((body, ""));
    !(int.is_empty() && frac.is_empty())
        && int.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit())
}

fn is_float(s: &str) -> bool {
    if matches!(s, "INF" | "+INF" | "-INF" | "NaN") {
        return true;
    }
    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(pos) => (&s[..pos], Some(&s[pos + 1..])),
        None => (s, None),
    };
    let exponent_ok = exponent.map_or(true, |e| {
        let digits = e.strip_prefix(['+', '-']).unwrap_or(e);
        !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
    });
    is_decimal(mantissa) && exponent_ok
}

fn digits(s: &str, n: usize) -> Option<u32> {
    if s.len() == n && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

/// Strip an optional timezone (`Z` or `+hh:mm`/`-hh:mm`)
///
/// Calendar values are ASCII; anything else is rejected here.
fn strip_timezone(s: &str) -> Option<&str> {
    if !s.is_ascii() {
        return None;
    }
    if let Some(rest) = s.strip_suffix('Z') {
        return Some(rest);
    }
    if s.len() > 6 {
        let (head, tz) = s.split_at(s.len() - 6);
        let tb = tz.as_bytes();
        if (tb[0] == b'+' || tb[0] == b'-') && tb[3] == b':' {
            let hours = digits(&tz[1..3], 2)?;
            let minutes = digits(&tz[4..6], 2)?;
            return (hours <= 14 && minutes <= 59).then_some(head);
        }
    }
    Some(s)
}

fn is_leap(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn year_part(s: &str) -> Option<i64> {
    let body = s.strip_prefix('-').unwrap_or(s);
    if body.len() < 4 || !body.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i64 = body.parse().ok()?;
    (year != 0).then_some(year)
}

fn is_date_body(s: &str) -> bool {
    let mut parts = s.rsplitn(3, '-');
    let (day, month, year) = match (parts.next(), parts.next(), parts.next()) {
        (Some(d), Some(m), Some(y)) => (d, m, y),
        _ => return false,
    };
    let (year, month, day) = match (year_part(year), digits(month, 2), digits(day, 2)) {
        (Some(y), Some(m), Some(d)) => (y, m, d),
        _ => return false,
    };
    let days_in_month = match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap(year) => 29,
        2 => 28,
        _ => return false,
    };
    day >= 1 && day <= days_in_month
}

fn is_time_body(s: &str) -> bool {
    let (hms, fraction) = s.split_once('.').unwrap_or((s, "0"));
    if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let mut parts = hms.split(':');
    let (h, m, sec) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(m), Some(s), None) => (digits(h, 2), digits(m, 2), digits(s, 2)),
        _ => return false,
    };
    match (h, m, sec) {
        (Some(24), Some(0), Some(0)) => fraction.bytes().all(|b| b == b'0'),
        (Some(h), Some(m), Some(s)) => h < 24 && m < 60 && s < 60,
        _ => false,
    }
}

fn is_date(s: &str) -> bool {
    strip_timezone(s).map_or(false, is_date_body)
}

fn is_time(s: &str) -> bool {
    strip_timezone(s).map_or(false, is_time_body)
}

fn is_date_time(s: &str) -> bool {
    match strip_timezone(s).and_then(|body| body.split_once('T')) {
        Some((date, time)) => is_date_body(date) && is_time_body(time),
        None => false,
    }
}

fn is_gyear(s: &str) -> bool {
    strip_timezone(s).and_then(year_part).is_some()
}

fn is_duration(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    let body = match body.strip_prefix('P') {
        Some(b) if !b.is_empty() => b,
        _ => return false,
    };
    let (date, time) = match body.split_once('T') {
        Some((_, "")) => return false,
        Some((d, t)) => (d, Some(t)),
        None => (body, None),
    };
    fn components(part: &str, units: &[u8], allow_fraction_last: bool) -> bool {
        let mut rest = part;
        let mut next_unit = 0;
        while !rest.is_empty() {
            let len = rest.bytes().take_while(|b| b.is_ascii_digit() || *b == b'.').count();
            if len == 0 || len >= rest.len() {
                return false;
            }
            let number = &rest[..len];
            let unit = rest.as_bytes()[len];
            let position = match units[next_unit..].iter().position(|&u| u == unit) {
                Some(p) => next_unit + p,
                None => return false,
            };
            let fraction_ok = !number.contains('.') || (allow_fraction_last && position == units.len() - 1);
            if !fraction_ok || !is_decimal(number) {
                return false;
            }
            next_unit = position + 1;
            rest = &rest[len + 1..];
        }
        true
    }
    components(date, b"YMD", false) && time.map_or(true, |t| components(t, b"HMS", true))
}

fn is_base64(s: &str) -> bool {
    let data: Vec<u8> = s.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if data.len() % 4 != 0 {
        return false;
    }
    let padding = data.iter().rev().take_while(|&&b| b == b'=').count();
    padding <= 2
        && data[..data.len() - padding]
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(Builtin::from_local("int"), Some(Builtin::Int));
        assert_eq!(Builtin::from_local("NCName"), Some(Builtin::NCName));
        assert_eq!(Builtin::from_local("nope"), None);
        assert!(Builtin::ALL.iter().all(|b| Builtin::from_local(b.name()) == Some(*b)));
    }

    #[test]
    fn test_whitespace() {
        assert_eq!(WhiteSpace::Collapse.apply("  a \n b "), "a b");
        assert_eq!(WhiteSpace::Replace.apply("a\tb"), "a b");
        assert_eq!(WhiteSpace::Preserve.apply(" a "), " a ");
    }

    #[test]
    fn test_integers() {
        assert!(Builtin::Int.check("-2147483648").is_ok());
        assert!(Builtin::Int.check("2147483648").is_err());
        assert!(Builtin::UnsignedByte.check("255").is_ok());
        assert!(Builtin::UnsignedByte.check("-1").is_err());
        assert!(Builtin::PositiveInteger.check("0").is_err());
        assert!(Builtin::NonNegativeInteger.check("-0").is_ok());
        assert!(Builtin::Integer.check("123456789012345678901234567890123456789012").is_ok());
        assert!(Builtin::Integer.check("1.0").is_err());
    }

    #[test]
    fn test_numbers() {
        assert!(Builtin::Decimal.check("-1.50").is_ok());
        assert!(Builtin::Decimal.check(".5").is_ok());
        assert!(Builtin::Decimal.check("1e3").is_err());
        assert!(Builtin::Double.check("1e3").is_ok());
        assert!(Builtin::Double.check("-INF").is_ok());
        assert!(Builtin::Double.check("inf").is_err());
        assert_eq!(Builtin::Decimal.compare("2", "10"), Some(Ordering::Less));
        assert!(Builtin::Decimal.equal("1.0", "1"));
    }

    #[test]
    fn test_temporal() {
        assert!(Builtin::Date.check("2024-02-29").is_ok());
        assert!(Builtin::Date.check("2023-02-29").is_err());
        assert!(Builtin::Date.check("2024-01-01Z").is_ok());
        assert!(Builtin::DateTime.check("2024-01-01T10:20:30.5+02:00").is_ok());
        assert!(Builtin::DateTime.check("2024-01-01 10:20:30").is_err());
        assert!(Builtin::Time.check("24:00:00").is_ok());
        assert!(Builtin::Time.check("23:60:00").is_err());
        assert!(Builtin::GYear.check("-0044").is_ok());
        assert!(Builtin::Duration.check("P1Y2M3DT4H5M6.5S").is_ok());
        assert!(Builtin::Duration.check("PT").is_err());
        assert!(Builtin::Duration.check("P1.5Y").is_err());
        assert!(Builtin::Duration.check("P2D1Y").is_err());
    }

    #[test]
    fn test_temporal_non_ascii() {
        for value in ["a€aaaaa", "2024-01-0€", "2024-01-01T10:20:3€", "1999€:00", "P1€"] {
            assert!(Builtin::Date.check(value).is_err());
            assert!(Builtin::DateTime.check(value).is_err());
            assert!(Builtin::Time.check(value).is_err());
            assert!(Builtin::GYear.check(value).is_err());
            assert!(Builtin::Duration.check(value).is_err());
        }
    }

    #[test]
    fn test_binary_and_names() {
        assert!(Builtin::HexBinary.check("0aFF").is_ok());
        assert!(Builtin::HexBinary.check("0aF").is_err());
        assert!(Builtin::Base64Binary.check("aGVsbG8=").is_ok());
        assert!(Builtin::Base64Binary.check("aGVsbG8").is_err());
        assert_eq!(Builtin::Base64Binary.length_of("aGVsbG8="), 5);
        assert_eq!(Builtin::HexBinary.length_of("0aFF"), 2);
        assert!(Builtin::Language.check("en-US").is_ok());
        assert!(Builtin::Language.check("toolonglanguage").is_err());
        assert!(Builtin::QName.check("xs:string").is_ok());
        assert!(Builtin::NCName.check("a:b").is_err());
        assert!(Builtin::Boolean.check("yes").is_err());
    }
}
