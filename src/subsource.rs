//! Named sub-regions of a source (cores, outflows, ...), each described by a
//! `type = subsource` configuration section.

use std::collections::BTreeMap;

use crate::data::model::Value;
use crate::error::{Error, Result};
use crate::units::{Quantity, SkyPosition};

/// Section `type` that marks a subsource.
pub const SUBSOURCE_TYPE: &str = "subsource";

#[derive(Debug, Clone, PartialEq)]
pub struct Subsource {
    pub name: String,
    /// `position` when both `ra` and `dec` were given, `radius` as a
    /// quantity, anything else verbatim.
    pub info: BTreeMap<String, Value>,
}

impl Subsource {
    /// Build a subsource from section options.
    ///
    /// `ra`, `dec` and `frame` (default `icrs`) are folded into a single
    /// `position` when both coordinates are present; otherwise they are kept
    /// as plain text. Without an explicit `name` the `name` option is used.
    pub fn from_dict<I, K, V>(options: I, name: Option<&str>) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let label = name.unwrap_or(SUBSOURCE_TYPE).to_string();
        let mut info = BTreeMap::new();
        let mut ra = None;
        let mut dec = None;
        let mut frame = None;

        for (key, value) in options {
            let key = key.as_ref().trim().to_lowercase();
            let value = value.as_ref();
            match key.as_str() {
                "ra" => ra = Some(value.to_string()),
                "dec" => dec = Some(value.to_string()),
                "frame" => frame = Some(value.to_string()),
                "radius" => {
                    let radius = Quantity::parse(value).ok_or_else(|| Error::TypeCoercion {
                        section: label.clone(),
                        option: key.clone(),
                        value: value.to_string(),
                        kind: "quantity".to_string(),
                    })?;
                    info.insert(key, Value::Quantity(radius));
                }
                _ => {
                    info.insert(key, Value::Str(value.to_string()));
                }
            }
        }

        match (ra, dec) {
            (Some(ra), Some(dec)) => {
                let position = SkyPosition::parse(&ra, &dec, frame.as_deref()).ok_or_else(|| {
                    Error::TypeCoercion {
                        section: label.clone(),
                        option: "ra/dec".to_string(),
                        value: format!("{ra} {dec}"),
                        kind: "position".to_string(),
                    }
                })?;
                info.insert("position".to_string(), Value::Position(position));
            }
            (ra, dec) => {
                for (key, value) in [("ra", ra), ("dec", dec), ("frame", frame)] {
                    if let Some(value) = value {
                        info.insert(key.to_string(), Value::Str(value));
                    }
                }
            }
        }

        let name = match name {
            Some(name) => name.to_string(),
            None => info
                .get("name")
                .map(|v| v.to_string())
                .unwrap_or_default(),
        };
        Ok(Self { name, info })
    }

    /// Flatten back to configuration text: `position` becomes `ra`, `dec`
    /// and `frame`; quantities become `"<value> <unit>"`.
    pub fn to_dict(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for (key, value) in &self.info {
            match value {
                Value::Position(pos) => {
                    out.insert("ra".to_string(), pos.ra.to_hms());
                    out.insert("dec".to_string(), pos.dec.to_dms());
                    out.insert("frame".to_string(), pos.frame.clone());
                }
                other => {
                    out.insert(key.clone(), other.to_string());
                }
            }
        }
        out
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.info.get(key)
    }

    pub fn position(&self) -> Option<&SkyPosition> {
        self.info.get("position").and_then(Value::as_position)
    }

    pub fn radius(&self) -> Option<&Quantity> {
        self.info.get("radius").and_then(Value::as_quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Angle;
    use proptest::prelude::*;

    #[test]
    fn composes_position_and_radius() {
        let sub = Subsource::from_dict(
            [
                ("ra", "05h34m31.9s"),
                ("dec", "+22d00m52s"),
                ("radius", "1.5 arcsec"),
                ("note", "bright knot"),
            ],
            Some("core"),
        )
        .unwrap();

        assert_eq!(sub.name, "core");
        let pos = sub.position().unwrap();
        assert_eq!(pos.frame, "icrs");
        assert_eq!(pos.ra, Angle::parse_ra("05h34m31.9s").unwrap());
        assert_eq!(sub.radius(), Some(&Quantity::new(1.5, "arcsec")));
        assert_eq!(sub.get("note"), Some(&Value::Str("bright knot".into())));
        assert!(sub.get("ra").is_none());
    }

    #[test]
    fn lone_coordinate_stays_text() {
        let sub = Subsource::from_dict([("ra", "10h00m00s"), ("frame", "fk5")], None).unwrap();
        assert!(sub.position().is_none());
        assert_eq!(sub.get("ra"), Some(&Value::Str("10h00m00s".into())));
        assert_eq!(sub.get("frame"), Some(&Value::Str("fk5".into())));
    }

    #[test]
    fn name_option_names_the_subsource() {
        let sub = Subsource::from_dict([("name", "outflow")], None).unwrap();
        assert_eq!(sub.name, "outflow");
    }

    #[test]
    fn bad_radius_fails() {
        let err = Subsource::from_dict([("radius", "wide")], Some("core"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::TypeCoercion { option, .. } if option == "radius"));
    }

    #[test]
    fn to_dict_expands_position() {
        let sub = Subsource::from_dict(
            [("ra", "05h34m31.9s"), ("dec", "-05d23m28s"), ("frame", "FK5")],
            Some("core"),
        )
        .unwrap();
        let dict = sub.to_dict();
        assert_eq!(dict["ra"], "05h34m31.900000s");
        assert_eq!(dict["dec"], "-05d23m28.000000s");
        assert_eq!(dict["frame"], "fk5");
        assert!(!dict.contains_key("position"));
    }

    fn arb_subsource() -> impl Strategy<Value = Subsource> {
        (
            prop::option::of((0.0..360.0f64, -90.0..90.0f64, prop::sample::select(vec!["icrs", "fk5", "galactic"]))),
            prop::option::of((-1e6..1e6f64, prop::sample::select(vec!["arcsec", "au", "pc", ""]))),
            prop::collection::btree_map(
                "[a-z]{1,8}".prop_filter("reserved", |k| {
                    !["ra", "dec", "frame", "radius", "position"].contains(&k.as_str())
                }),
                "[A-Za-z0-9]{1,10}",
                0..4,
            ),
        )
            .prop_map(|(position, radius, extra)| {
                let mut info: BTreeMap<String, Value> =
                    extra.into_iter().map(|(k, v)| (k, Value::Str(v))).collect();
                if let Some((ra, dec, frame)) = position {
                    let pos = SkyPosition::new(Angle::from_degrees(ra), Angle::from_degrees(dec), frame);
                    info.insert("position".into(), Value::Position(pos));
                }
                if let Some((value, unit)) = radius {
                    info.insert("radius".into(), Value::Quantity(Quantity::new(value, unit)));
                }
                Subsource {
                    name: "sub".into(),
                    info,
                }
            })
    }

    proptest! {
        #[test]
        fn dict_round_trip(sub in arb_subsource()) {
            let again = Subsource::from_dict(sub.to_dict(), Some("sub")).unwrap();
            prop_assert_eq!(again.info, sub.info);
        }
    }
}
