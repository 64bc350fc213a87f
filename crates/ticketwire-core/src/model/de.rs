// Lenient deserializers for server payloads.
//
// Prices come through as JSON numbers or as decimal strings ("79.50")
// depending on the endpoint, and timestamps as epoch milliseconds or
// RFC 3339 strings.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, de};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

fn to_f64<E: de::Error>(raw: NumberOrString) -> Result<f64, E> {
    match raw {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| E::custom(format!("expected a number, got '{s}'"))),
    }
}

pub(crate) fn f64_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    to_f64(NumberOrString::deserialize(d)?)
}

pub(crate) fn opt_f64_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Option::<NumberOrString>::deserialize(d)?
        .map(to_f64)
        .transpose()
}

pub(crate) fn u32_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let n = f64_lenient(d)?;
    if n < 0.0 || n.fract() != 0.0 || n > f64::from(u32::MAX) {
        return Err(de::Error::custom(format!("expected a count, got {n}")));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(n as u32)
}

pub(crate) fn opt_u32_lenient<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "u32_lenient")] u32);

    Ok(Option::<Wrapper>::deserialize(d)?.map(|w| w.0))
}

pub(crate) fn u32_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    Ok(opt_u32_lenient(d)?.unwrap_or(0))
}

/// Treat an explicit `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

fn to_timestamp<E: de::Error>(raw: RawTimestamp) -> Result<DateTime<Utc>, E> {
    match raw {
        RawTimestamp::Millis(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| E::custom(format!("timestamp out of range: {ms}"))),
        RawTimestamp::Text(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                    .map(|naive| naive.and_utc())
            })
            .map_err(|_| E::custom(format!("unrecognised timestamp '{s}'"))),
    }
}

pub(crate) fn timestamp_lenient<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<DateTime<Utc>, D::Error> {
    to_timestamp(RawTimestamp::deserialize(d)?)
}

pub(crate) fn opt_timestamp_lenient<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    Option::<RawTimestamp>::deserialize(d)?
        .map(to_timestamp)
        .transpose()
}
