//! Small human-readable duration parsing for plan YAML (`"500ms"`, `"30s"`,
//! `"2m"`), since the workspace doesn't otherwise depend on a duration
//! parsing crate.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn parse(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let split_at = input
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .ok_or_else(|| format!("duration {input:?} has no unit (expected ms, s, m, or h)"))?;
    let (number, unit) = input.split_at(split_at);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("duration {input:?} has an invalid number"))?;
    let millis = match unit {
        "ms" => value,
        "s" => value * 1_000.0,
        "m" => value * 60_000.0,
        "h" => value * 3_600_000.0,
        other => return Err(format!("duration {input:?} has unknown unit {other:?}")),
    };
    Ok(Duration::from_secs_f64(millis / 1_000.0))
}

pub fn render(d: Duration) -> String {
    let ms = d.as_secs_f64() * 1_000.0;
    if ms < 1_000.0 {
        format!("{ms}ms")
    } else {
        format!("{}s", d.as_secs_f64())
    }
}

pub mod human {
    use super::{parse, render, Duration};
    use super::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        render(*d).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }
}

pub mod human_option {
    use super::{parse, render, Duration};
    use super::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        d.map(render).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        raw.map(|r| parse(&r).map_err(serde::de::Error::custom)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_milliseconds() {
        assert_eq!(parse("100ms").unwrap(), Duration::from_millis(100));
    }

    #[test]
    fn parses_seconds_and_minutes() {
        assert_eq!(parse("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse("2m").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(parse("5x").is_err());
    }
}
