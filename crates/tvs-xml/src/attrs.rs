//! Typed access to the attributes of one element.

use std::collections::BTreeMap;
use std::str::FromStr;

use quick_xml::escape::unescape;
use quick_xml::events::BytesStart;

use crate::{Result, XmlError};

#[derive(Debug, Clone, Default)]
pub(crate) struct Attrs {
    element: &'static str,
    values: BTreeMap<String, String>,
}

impl Attrs {
    /// Collects attributes; names are matched case-sensitively.
    pub(crate) fn from_start(element: &'static str, start: &BytesStart<'_>) -> Result<Self> {
        let mut values = BTreeMap::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|err| XmlError::Syntax {
                position: 0,
                message: err.to_string(),
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let raw = String::from_utf8_lossy(&attr.value).to_string();
            let value = unescape(&raw)
                .map_err(|err| XmlError::Syntax {
                    position: 0,
                    message: err.to_string(),
                })?
                .into_owned();
            values.insert(key, value);
        }
        Ok(Self { element, values })
    }

    pub(crate) fn element(&self) -> &'static str {
        self.element
    }

    /// Value of the first present name in `names`, trimmed and non-empty.
    pub(crate) fn optional_any(&self, names: &[&'static str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.values.get(*name))
            .map(|value| value.trim())
            .find(|value| !value.is_empty())
    }

    pub(crate) fn optional(&self, name: &'static str) -> Option<&str> {
        self.optional_any(&[name])
    }

    pub(crate) fn required(&self, name: &'static str) -> Result<&str> {
        self.optional(name).ok_or(XmlError::MissingAttribute {
            element: self.element,
            attribute: name,
        })
    }

    fn invalid(&self, attribute: &'static str, value: &str) -> XmlError {
        XmlError::InvalidAttribute {
            element: self.element,
            attribute,
            value: value.to_string(),
        }
    }

    fn parse_value<T: FromStr>(&self, name: &'static str, value: &str) -> Result<T> {
        value.parse().map_err(|_| self.invalid(name, value))
    }

    pub(crate) fn parse_optional<T: FromStr>(&self, name: &'static str) -> Result<Option<T>> {
        self.optional(name)
            .map(|value| self.parse_value(name, value))
            .transpose()
    }

    pub(crate) fn parse_required<T: FromStr>(&self, name: &'static str) -> Result<T> {
        let value = self.required(name)?;
        self.parse_value(name, value)
    }

    pub(crate) fn parse_or<T: FromStr>(&self, name: &'static str, default: T) -> Result<T> {
        Ok(self.parse_optional(name)?.unwrap_or(default))
    }

    /// Index strictly below `limit`.
    pub(crate) fn index_below(&self, name: &'static str, limit: usize) -> Result<usize> {
        let value = self.required(name)?;
        let index: usize = self.parse_value(name, value)?;
        if index < limit {
            Ok(index)
        } else {
            Err(self.invalid(name, value))
        }
    }

    /// Finite floating-point value.
    pub(crate) fn float_required(&self, name: &'static str) -> Result<f64> {
        let value: f64 = self.parse_required(name)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(self.invalid(name, &value.to_string()))
        }
    }

    pub(crate) fn float_or(&self, name: &'static str, default: f64) -> Result<f64> {
        match self.optional(name) {
            Some(_) => self.float_required(name),
            None => Ok(default),
        }
    }

    /// `true`/`false`, case-insensitive, under any of `names`.
    pub(crate) fn bool_any(&self, names: &[&'static str], default: bool) -> Result<bool> {
        let Some(value) = self.optional_any(names) else {
            return Ok(default);
        };
        if value.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if value.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(self.invalid(names[0], value))
        }
    }

    pub(crate) fn bool_or(&self, name: &'static str, default: bool) -> Result<bool> {
        self.bool_any(&[name], default)
    }

    pub(crate) fn text_or_empty(&self, name: &'static str) -> String {
        self.optional(name).unwrap_or_default().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(xml: &str) -> Attrs {
        let start = BytesStart::from_content(xml, 6);
        Attrs::from_start("SOURCE", &start).unwrap()
    }

    #[test]
    fn synonyms_and_booleans() {
        let a = attrs(r#"SOURCE STUDY="TRUE" LOCKED="no""#);
        assert!(a.bool_any(&["DESIRED", "STUDY"], false).unwrap());
        assert!(matches!(
            a.bool_or("LOCKED", false),
            Err(XmlError::InvalidAttribute { attribute: "LOCKED", .. })
        ));
        assert!(!a.bool_or("UNDESIRED", false).unwrap());
    }

    #[test]
    fn required_and_numeric_values() {
        let a = attrs(r#"SOURCE CHANNEL=" 7 " ERP="x" CITY="A &amp; B""#);
        assert_eq!(a.parse_required::<i32>("CHANNEL").unwrap(), 7);
        assert!(a.float_required("ERP").is_err());
        assert!(matches!(
            a.required("COUNTRY"),
            Err(XmlError::MissingAttribute { attribute: "COUNTRY", .. })
        ));
        assert_eq!(a.text_or_empty("CITY"), "A & B");
    }
}
