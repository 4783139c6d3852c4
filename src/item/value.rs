use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// A field value in render-surface form.
pub type RenderValue = serde_json::Value;

/// A serialized record: declared field names to render values, in declaration order.
pub type FieldMap = serde_json::Map<String, RenderValue>;

/// Types that can be used as record fields.
///
/// Primitive scalars pass through unchanged; everything else is converted to
/// a primitive the render surface understands. The type's `Default` value
/// doubles as "not specified" when records are merged.
pub trait FieldValue: Clone + PartialEq + Default + Send + Sync {
    fn to_render(&self) -> RenderValue;

    fn is_unset(&self) -> bool {
        *self == Self::default()
    }
}

macro_rules! passthrough_field_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FieldValue for $ty {
                fn to_render(&self) -> RenderValue {
                    RenderValue::from(self.clone())
                }
            }
        )*
    };
}

passthrough_field_value!(
    bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String,
);

impl<T: FieldValue> FieldValue for Option<T> {
    fn to_render(&self) -> RenderValue {
        match self {
            Some(value) => value.to_render(),
            None => RenderValue::Null,
        }
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn to_render(&self) -> RenderValue {
        RenderValue::Array(self.iter().map(FieldValue::to_render).collect())
    }
}

impl FieldValue for RenderValue {
    fn to_render(&self) -> RenderValue {
        self.clone()
    }
}

impl FieldValue for DateTime<Utc> {
    fn to_render(&self) -> RenderValue {
        RenderValue::String(self.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl FieldValue for Uuid {
    fn to_render(&self) -> RenderValue {
        RenderValue::String(self.to_string())
    }
}

/// Durations become a number of milliseconds.
impl FieldValue for Duration {
    fn to_render(&self) -> RenderValue {
        RenderValue::from(self.as_secs_f64() * 1000.0)
    }
}

/// Paths become `file://` URLs.
impl FieldValue for PathBuf {
    fn to_render(&self) -> RenderValue {
        RenderValue::String(format!("file://{}", self.display()))
    }
}
