//! Conversion between attribute scalars and json values.

use serde_json::{Number, Value};

use crate::basic::attribute::AttributeType;
use crate::basic::meta_data::RealValueAsym;

pub(crate) trait JsonScalar: AttributeType {
    /// `None` when the value has the wrong shape; `null` reads as missing.
    fn from_json(value: &Value) -> Option<Self>;

    /// `None` for a missing value.
    fn to_json(&self) -> Option<Value>;
}

fn integral_from_json<T: TryFrom<i64>>(value: &Value) -> Option<T> {
    value.as_i64().and_then(|v| T::try_from(v).ok())
}

impl JsonScalar for i32 {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::missing()),
            v => integral_from_json(v),
        }
    }

    fn to_json(&self) -> Option<Value> {
        (!self.is_missing()).then(|| Value::from(*self))
    }
}

impl JsonScalar for i8 {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::missing()),
            v => integral_from_json(v),
        }
    }

    fn to_json(&self) -> Option<Value> {
        (!self.is_missing()).then(|| Value::from(*self))
    }
}

fn real_from_json(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(f64::NAN),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            "inf" | "+inf" => Some(f64::INFINITY),
            "-inf" => Some(f64::NEG_INFINITY),
            "nan" => Some(f64::NAN),
            _ => None,
        },
        _ => None,
    }
}

fn real_to_json(value: f64) -> Value {
    match Number::from_f64(value) {
        Some(n) => Value::Number(n),
        None if value.is_nan() => Value::from("nan"),
        None if value > 0.0 => Value::from("inf"),
        None => Value::from("-inf"),
    }
}

impl JsonScalar for f64 {
    fn from_json(value: &Value) -> Option<Self> {
        real_from_json(value)
    }

    fn to_json(&self) -> Option<Value> {
        (!self.is_missing()).then(|| real_to_json(*self))
    }
}

impl JsonScalar for RealValueAsym {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::missing()),
            Value::Array(phases) if phases.len() == 3 => Some(RealValueAsym::new(
                real_from_json(&phases[0])?,
                real_from_json(&phases[1])?,
                real_from_json(&phases[2])?,
            )),
            _ => None,
        }
    }

    fn to_json(&self) -> Option<Value> {
        (!self.is_missing()).then(|| Value::Array(self.iter().map(|x| real_to_json(*x)).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_special_reals() {
        assert_eq!(f64::from_json(&json!("inf")), Some(f64::INFINITY));
        assert_eq!(f64::from_json(&json!("+inf")), Some(f64::INFINITY));
        assert_eq!(f64::from_json(&json!("-inf")), Some(f64::NEG_INFINITY));
        assert!(f64::from_json(&json!("nan")).unwrap().is_nan());
        assert!(f64::from_json(&Value::Null).unwrap().is_nan());
        assert_eq!(f64::from_json(&json!("1.5")), None);
        assert_eq!(f64::INFINITY.to_json(), Some(json!("inf")));
        assert_eq!(f64::NAN.to_json(), None);
    }

    #[test]
    fn test_integral_range() {
        assert_eq!(i8::from_json(&json!(1)), Some(1));
        assert_eq!(i8::from_json(&json!(300)), None);
        assert_eq!(i32::from_json(&json!(1.5)), None);
        assert_eq!(i32::from_json(&Value::Null), Some(i32::MIN));
        assert_eq!(i32::MIN.to_json(), None);
    }

    #[test]
    fn test_asym_values() {
        let v = RealValueAsym::from_json(&json!([1.0, "nan", 3])).unwrap();
        assert_eq!(v[0], 1.0);
        assert!(v[1].is_nan());
        assert_eq!(v.to_json(), Some(json!([1.0, "nan", 3.0])));
        assert_eq!(RealValueAsym::from_json(&json!([1.0, 2.0])), None);
    }
}
