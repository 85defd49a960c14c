//! Serde helpers for `f64` values that may be infinite or NaN.
//!
//! Strict JSON has no encoding for non-finite numbers (`serde_json` writes
//! them as `null`). These helpers write them as the strings `"-Infinity"`,
//! `"Infinity"` and `"NaN"` instead, so an empty-band `-inf` survives a
//! round trip. Use with `#[serde(with = "crate::analysis::sentinel")]` or,
//! for sequences, `#[serde(with = "crate::analysis::sentinel::vec")]`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const NEG_INF: &str = "-Infinity";
const POS_INF: &str = "Infinity";
const NAN: &str = "NaN";

/// An `f64` that serialises non-finite values as strings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sentinel(pub f64);

impl Serialize for Sentinel {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let v = self.0;
        if v.is_nan() {
            s.serialize_str(NAN)
        } else if v == f64::INFINITY {
            s.serialize_str(POS_INF)
        } else if v == f64::NEG_INFINITY {
            s.serialize_str(NEG_INF)
        } else {
            s.serialize_f64(v)
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Raw {
    Number(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Sentinel {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Number(v) => Ok(Sentinel(v)),
            Raw::Text(t) => match t.as_str() {
                NEG_INF => Ok(Sentinel(f64::NEG_INFINITY)),
                POS_INF => Ok(Sentinel(f64::INFINITY)),
                NAN => Ok(Sentinel(f64::NAN)),
                other => Err(serde::de::Error::custom(format!(
                    "expected a number or one of {NEG_INF:?}, {POS_INF:?}, {NAN:?}, got {other:?}"
                ))),
            },
        }
    }
}

pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    Sentinel(*v).serialize(s)
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Sentinel::deserialize(d).map(|s| s.0)
}

/// The same encoding for `Vec<f64>`.
pub mod vec {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Sentinel;

    pub fn serialize<S: Serializer>(v: &[f64], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(v.iter().map(|&x| Sentinel(x)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
        let raw = Vec::<Sentinel>::deserialize(d)?;
        Ok(raw.into_iter().map(|s| s.0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct Row {
        #[serde(with = "crate::analysis::sentinel")]
        power: f64,
        #[serde(with = "crate::analysis::sentinel::vec")]
        history: Vec<f64>,
    }

    #[test]
    fn non_finite_values_become_strings() {
        let row = Row {
            power: f64::NEG_INFINITY,
            history: vec![1.5, f64::NAN, f64::INFINITY],
        };
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(
            json,
            r#"{"power":"-Infinity","history":[1.5,"NaN","Infinity"]}"#
        );
    }

    #[test]
    fn strings_read_back_as_non_finite() {
        let row: Row =
            serde_json::from_str(r#"{"power":"-Infinity","history":[2,"NaN"]}"#).unwrap();
        assert_eq!(row.power, f64::NEG_INFINITY);
        assert_eq!(row.history[0], 2.0);
        assert!(row.history[1].is_nan());
    }

    #[test]
    fn unknown_string_is_rejected() {
        let err = serde_json::from_str::<Row>(r#"{"power":"loud","history":[]}"#);
        assert!(err.is_err());
    }
}
