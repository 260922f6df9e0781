//! Raw submitted form values

use serde::Deserialize;

/// Raw submitted scalar: text from an HTML form or a JSON number
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_text(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(v) => v.trim().to_string(),
        }
    }

    /// Integer value; text is parsed, floats only when whole
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Self::Float(_) => None,
            Self::Text(v) => v.trim().parse().ok(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value() {
        let values: Vec<FieldValue> = serde_json::from_str(r#"[10, 2.5, " 7 ", "x"]"#).unwrap();
        assert_eq!(values[0].as_int(), Some(10));
        assert_eq!(values[1].as_int(), None);
        assert_eq!(values[1].as_text(), "2.5");
        assert_eq!(values[2].as_int(), Some(7));
        assert_eq!(values[3].as_int(), None);
    }
}
