use std::fmt;
use std::time::Duration;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Duration written as a humantime string (`"30s"`, `"1m30s"`, `"500ms"`) or
/// a plain number of seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub fn into_inner(self) -> Duration {
        self.0
    }
}

impl From<Duration> for HumanDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", humantime::format_duration(self.0))
    }
}

impl Serialize for HumanDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = HumanDuration;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a duration such as \"30s\" or a number of seconds")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(HumanDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map(|secs| HumanDuration(Duration::from_secs(secs)))
                    .map_err(|_| E::custom(format!("duration must not be negative, got {}", v)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom(format!(
                        "duration must be a finite, non-negative number, got {}",
                        v
                    )));
                }
                Duration::try_from_secs_f64(v)
                    .map(HumanDuration)
                    .map_err(|e| E::custom(format!("duration {} out of range: {}", v, e)))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                humantime::parse_duration(v.trim())
                    .map(HumanDuration)
                    .map_err(|e| E::custom(format!("invalid duration '{}': {}", v, e)))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_strings_and_numbers() {
        let parsed: Vec<HumanDuration> =
            serde_yaml::from_str("[30s, 1m30s, 500ms, 2, 0.5]").unwrap();
        let expected = [
            Duration::from_secs(30),
            Duration::from_secs(90),
            Duration::from_millis(500),
            Duration::from_secs(2),
            Duration::from_millis(500),
        ];
        assert_eq!(
            parsed.into_iter().map(HumanDuration::into_inner).collect::<Vec<_>>(),
            expected
        );
    }

    #[test]
    fn test_rejects_negative_and_garbage() {
        assert!(serde_yaml::from_str::<HumanDuration>("-5").is_err());
        assert!(serde_yaml::from_str::<HumanDuration>("-1.5").is_err());
        assert!(serde_yaml::from_str::<HumanDuration>("soon").is_err());
        assert!(serde_yaml::from_str::<HumanDuration>("1.0e30").is_err());
        assert!(serde_json::from_str::<HumanDuration>("1e300").is_err());
    }

    #[test]
    fn test_serializes_as_humantime() {
        let json = serde_json::to_string(&HumanDuration(Duration::from_secs(90))).unwrap();
        assert_eq!(json, "\"1m 30s\"");
    }
}
