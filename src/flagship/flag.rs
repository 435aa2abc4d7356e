use serde_json::Value;

/// A flag as seen by one visitor. `value` is `None` when nothing was resolved for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Flag {
    pub key: String,
    pub value: Option<Value>,
}

/// Types a flag value can be read as.
pub trait FlagType: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FlagType for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

impl FlagType for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl Flag {
    pub fn exists(&self) -> bool {
        self.value.as_ref().is_some_and(|v| !v.is_null())
    }

    /// Returns the flag's value, or `default` when it is unset or of another type.
    pub fn get_value<T: FlagType>(&self, default: T) -> T {
        self.value
            .as_ref()
            .filter(|v| !v.is_null())
            .and_then(T::from_value)
            .unwrap_or(default)
    }
}
