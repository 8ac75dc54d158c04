//! Deserialization implementation largely based on the [`envy`] crate.
//!
//! Hand-rolled so that optional credentials deserialize to `None` instead of
//! failing the whole config load, and so comma-separated vars can land in
//! `Vec` fields.
//!
//! [`envy`]: https://github.com/softprops/envy

use std::iter::empty;
use std::sync::LazyLock;

use serde::Deserialize;
use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{self, IntoDeserializer};
use thiserror::Error;
use tokio::sync::OnceCell;

static ENV_VARS: LazyLock<OnceCell<Env>> = LazyLock::new(OnceCell::new);
pub async fn vars() -> EnvResult<&'static Env> {
    ENV_VARS.get_or_try_init(|| async { Env::new() }).await
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Env {
    /// Postgres connection string. Absent means the store is disabled and the
    /// server runs with memory off.
    pub database_url: Option<String>,

    pub deepseek_api_key: Option<String>,
    pub openai_api_key: Option<String>,

    #[serde(default = "default_api_port")]
    pub server_api_port: u16,
    pub internal_post_token: String,

    pub bot_login: Option<String>,
    pub bot_token: Option<String>,
    #[serde(default)]
    pub bot_channels: Vec<String>,

    pub otel_exporter_otlp_endpoint: Option<String>,
    #[serde(default = "default_service_name")]
    pub api_service_name: String,
    #[serde(default = "default_tracer_name")]
    pub api_tracer_name: String,
}

impl Env {
    pub fn new() -> EnvResult<Self> {
        Ok(from_env::<Env>()?)
    }

    pub fn bot_configured(&self) -> bool {
        self.bot_login.is_some() && self.bot_token.is_some() && !self.bot_channels.is_empty()
    }
}

#[inline]
const fn default_api_port() -> u16 {
    6666
}

#[inline]
fn default_service_name() -> String {
    String::from("verdant-server")
}

#[inline]
fn default_tracer_name() -> String {
    String::from("verdant")
}

// ---
//  Deserializer implementation
// ---

struct EnvValue(String, String);
struct EnvKey(String);

struct Deserializer<'de, Iter: Iterator<Item = (String, String)>> {
    inner: MapDeserializer<'de, Pairs<Iter>, EnvDeserializeError>,
}

struct Pairs<Iter>
where
    Iter: IntoIterator<Item = (String, String)>,
{
    inner: Iter,
}

impl<'de> IntoDeserializer<'de, EnvDeserializeError> for EnvValue {
    type Deserializer = Self;
    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

impl<'de> IntoDeserializer<'de, EnvDeserializeError> for EnvKey {
    type Deserializer = Self;
    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

impl<Iter: Iterator<Item = (String, String)>> Iterator for Pairs<Iter> {
    type Item = (EnvKey, EnvValue);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(k, v)| (EnvKey(k.clone()), EnvValue(k, v)))
    }
}

macro_rules! forward_parsed_vals {
    ($($ty:ident => $method:ident,)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, EnvDeserializeError>
            where
                V: de::Visitor<'de>
            {
                match self.1.parse::<$ty>() {
                    Ok(val) => val.into_deserializer().$method(visitor),
                    Err(e) => Err(serde::de::Error::custom(format_args!(
                        "{}: while parsing '{}' (var: {})",
                        e, self.1, self.0
                    )))
                }
            }
        )*
    };
}

impl<'de> serde::de::Deserializer<'de> for EnvValue {
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.1.into_deserializer().deserialize_any(visitor)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        if self.1.is_empty() {
            SeqDeserializer::new(empty::<EnvValue>()).deserialize_seq(visitor)
        } else {
            let values = self
                .1
                .split(',')
                .map(|v| EnvValue(self.0.clone(), v.trim().to_owned()));
            SeqDeserializer::new(values).deserialize_seq(visitor)
        }
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_some(self)
    }

    forward_parsed_vals! {
        bool => deserialize_bool,
        u8 => deserialize_u8,
        u16 => deserialize_u16,
        u32 => deserialize_u32,
        u64 => deserialize_u64,
        i8 => deserialize_i8,
        i16 => deserialize_i16,
        i32 => deserialize_i32,
        i64 => deserialize_i64,
        f32 => deserialize_f32,
        f64 => deserialize_f64,
    }

    serde::forward_to_deserialize_any! {
        char str string unit bytes byte_buf map
        unit_struct newtype_struct tuple_struct identifier tuple
        ignored_any enum
        struct
    }
}

impl<'de> serde::de::Deserializer<'de> for EnvKey {
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.0.into_deserializer().deserialize_any(visitor)
    }

    serde::forward_to_deserialize_any! {
        char str string unit seq option bytes byte_buf map
        unit_struct newtype_struct tuple_struct identifier tuple ignored_any
        bool u8 u16 u32 u64 i8 i16 i32 i64 f32 f64 enum struct
    }
}

impl<'de, Iter: Iterator<Item = (String, String)>> Deserializer<'de, Iter> {
    fn new(vars: Iter) -> Self {
        Deserializer {
            inner: MapDeserializer::new(Pairs { inner: vars }),
        }
    }
}

impl<'de, Iter: Iterator<Item = (String, String)>> serde::de::Deserializer<'de>
    for Deserializer<'de, Iter>
{
    type Error = EnvDeserializeError;
    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.deserialize_map(visitor)
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_map(self.inner)
    }

    serde::forward_to_deserialize_any! {
        char str string unit seq option bytes byte_buf
        newtype_struct unit_struct tuple_struct identifier
        tuple ignored_any bool u8 u16 u32 u64 i8 i16 i32 i64
        f32 f64 enum struct
    }
}

pub fn from_env<T>() -> Result<T, EnvDeserializeError>
where
    T: serde::de::DeserializeOwned,
{
    from_iter(dotenvy::vars())
}

pub fn from_iter<Iter, T>(iter: Iter) -> Result<T, EnvDeserializeError>
where
    T: serde::de::DeserializeOwned,
    Iter: IntoIterator<Item = (String, String)>,
{
    T::deserialize(Deserializer::new(iter.into_iter()))
}

impl serde::de::Error for EnvDeserializeError {
    fn custom<T>(msg: T) -> Self
    where
        T: std::fmt::Display,
    {
        EnvDeserializeError::Custom(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        EnvDeserializeError::MissingValue(field.into())
    }
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    Dotenvy(#[from] dotenvy::Error),

    #[error(transparent)]
    DeserializationError(#[from] EnvDeserializeError),
}

#[derive(Debug, Error)]
pub enum EnvDeserializeError {
    #[error("env deserialization error: {0}")]
    Custom(String),

    #[error("{0}")]
    MissingValue(String),
}

#[cfg(test)]
mod test {
    use super::*;

    fn base_vars() -> Vec<(String, String)> {
        vec![
            ("INTERNAL_POST_TOKEN".into(), "hunter2".into()),
            ("SERVER_API_PORT".into(), "8099".into()),
            ("BOT_LOGIN".into(), "verdantbot".into()),
            ("BOT_TOKEN".into(), "oauthtokenvalue".into()),
            ("BOT_CHANNELS".into(), "lounge, task-board,wins".into()),
        ]
    }

    #[test]
    fn test_required_and_parsed_fields() {
        let env: Env = from_iter(base_vars()).unwrap();

        assert_eq!(env.internal_post_token, "hunter2");
        assert_eq!(env.server_api_port, 8099);
        assert_eq!(
            env.bot_channels,
            vec!["lounge".to_string(), "task-board".into(), "wins".into()]
        );
        assert!(env.bot_configured());
    }

    #[test]
    fn test_optional_fields_default_to_none() {
        let env: Env = from_iter(base_vars()).unwrap();

        assert!(env.database_url.is_none());
        assert!(env.deepseek_api_key.is_none());
        assert!(env.openai_api_key.is_none());
        assert!(env.otel_exporter_otlp_endpoint.is_none());
        assert_eq!(env.api_service_name, "verdant-server");
    }

    #[test]
    fn test_missing_required_field_errors() {
        let vars = vec![("SERVER_API_PORT".to_string(), "8099".to_string())];
        assert!(from_iter::<_, Env>(vars).is_err());
    }

    #[test]
    fn test_bad_port_is_a_parse_error() {
        let mut vars = base_vars();
        vars[1].1 = "not-a-port".into();

        assert!(from_iter::<_, Env>(vars).is_err());
    }
}
