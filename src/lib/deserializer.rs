use std::convert::TryFrom;
use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::{de, de::Visitor, Deserialize, Deserializer};

// Leaf values reach handler views as JSON strings, numbers only appear in
// views built by hand.
struct NumberOrString<T>(PhantomData<fn() -> Option<T>>);

impl<'de, T> Visitor<'de> for NumberOrString<T>
where
    T: FromStr + TryFrom<u64>,
    <T as FromStr>::Err: Display,
    <T as TryFrom<u64>>::Error: Display,
{
    type Value = Option<T>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("unsigned integer or string holding one")
    }

    fn visit_str<E>(self, value: &str) -> Result<Option<T>, E>
    where
        E: de::Error,
    {
        T::from_str(value.trim()).map(Some).map_err(|e| {
            de::Error::custom(format!("Invalid number {value:?}: {e}"))
        })
    }

    fn visit_u64<E>(self, value: u64) -> Result<Option<T>, E>
    where
        E: de::Error,
    {
        T::try_from(value).map(Some).map_err(de::Error::custom)
    }

    fn visit_none<E>(self) -> Result<Option<T>, E>
    where
        E: de::Error,
    {
        Ok(None)
    }

    fn visit_unit<E>(self) -> Result<Option<T>, E>
    where
        E: de::Error,
    {
        Ok(None)
    }
}

pub(crate) fn option_u32_or_string<'de, D>(
    deserializer: D,
) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(NumberOrString::<u32>(PhantomData))
}

/// Valueless leaves show up as empty mappings, their presence is what
/// matters.
pub(crate) fn presence<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(!matches!(value, serde_json::Value::Null | serde_json::Value::Bool(false)))
}
