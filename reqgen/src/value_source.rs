//! Scalar string values for named formats.
//!
//! The engine never fabricates format-specific strings itself; it asks a
//! [`RawValueSource`]. [`FakeValueSource`] covers the formats `OpenAPI`
//! documents commonly use and draws everything from the shared
//! [`Randomness`], so output stays reproducible under a seed.

use chrono::{DateTime, SecondsFormat};

use crate::random::Randomness;

pub trait RawValueSource {
    /// A string in the named `format`, or `None` when the format is unknown.
    fn string_for_format(&self, format: &str, random: &mut Randomness) -> Option<String>;

    /// A format-less string that carries no meaning for the API.
    fn opaque_string(&self, random: &mut Randomness) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FakeValueSource;

const BASE64_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz23456789!#$%&*+-=?@";

// 1970-01-01 .. 2100-01-01
const MAX_TIMESTAMP: i64 = 4_102_444_800;

fn uuid_string(random: &mut Randomness) -> String {
    let mut bytes = [0u8; 16];
    random.fill_bytes(&mut bytes);
    uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string()
}

fn from_alphabet(random: &mut Randomness, alphabet: &[u8], len: usize) -> String {
    (0..len)
        .filter_map(|_| random.choose(alphabet).map(|b| char::from(*b)))
        .collect()
}

fn timestamp(random: &mut Randomness) -> Option<DateTime<chrono::Utc>> {
    DateTime::from_timestamp(random.int_in(0, MAX_TIMESTAMP), 0)
}

impl RawValueSource for FakeValueSource {
    fn string_for_format(&self, format: &str, random: &mut Randomness) -> Option<String> {
        let value = match format {
            "uuid" => uuid_string(random),
            "date" => timestamp(random)?.format("%Y-%m-%d").to_string(),
            "date-time" => timestamp(random)?.to_rfc3339_opts(SecondsFormat::Secs, true),
            "time" => timestamp(random)?.format("%H:%M:%SZ").to_string(),
            "email" => format!("{}@example.com", random.hex_string(10)),
            "hostname" => format!("host-{}.example.com", random.hex_string(6)),
            "ipv4" => {
                let octets: Vec<String> =
                    (0..4).map(|_| random.int_in(1, 254).to_string()).collect();
                octets.join(".")
            }
            "ipv6" => {
                let groups: Vec<String> = (0..8).map(|_| random.hex_string(4)).collect();
                groups.join(":")
            }
            "uri" | "url" => format!("https://example.com/{}", random.hex_string(8)),
            "password" => from_alphabet(random, PASSWORD_ALPHABET, 16),
            "byte" => from_alphabet(random, BASE64_ALPHABET, 16),
            "binary" => random.hex_string(16),
            _ => return None,
        };
        Some(value)
    }

    fn opaque_string(&self, random: &mut Randomness) -> String {
        uuid_string(random)
    }
}
