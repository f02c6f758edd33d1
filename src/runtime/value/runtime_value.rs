//! Plain data values that cross the thread boundary by copy
//!
//! A `Value` carries no shared state, so handing a copy to another thread never
//! gives that thread access to owner-confined objects. Arguments and results of
//! marshaled calls are always values.

use std::fmt;

use indexmap::IndexMap;
use smallvec::SmallVec;

/// Positional call arguments.
pub type Args = SmallVec<[Value; 4]>;

/// Keyword call arguments, in the order they were supplied.
pub type Kwargs = IndexMap<String, Value>;

/// A plain data value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Empty value
    #[default]
    Unit,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 string
    Str(String),
    /// Ordered list of values
    List(Vec<Value>),
}

impl Value {
    /// Name of the value's type, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
        }
    }

    #[inline]
    pub fn is_unit(&self) -> bool {
        matches!(self, Value::Unit)
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float view; integers widen.
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Length of a string (in chars) or list.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::List(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Index into a list. Negative indices count from the end.
    pub fn index(
        &self,
        index: i64,
    ) -> Option<&Value> {
        let items = self.as_list()?;
        let len = items.len() as i64;
        let resolved = if index < 0 { len + index } else { index };
        if (0..len).contains(&resolved) {
            items.get(resolved as usize)
        } else {
            None
        }
    }
}

impl fmt::Display for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// Build an [`Args`] list from expressions convertible into [`Value`].
#[macro_export]
macro_rules! args {
    () => {
        $crate::runtime::value::Args::new()
    };
    ($($arg:expr),+ $(,)?) => {{
        let mut args = $crate::runtime::value::Args::new();
        $(args.push($crate::runtime::value::Value::from($arg));)+
        args
    }};
}

/// Build a [`Kwargs`] map: `kwargs! { "text" => "hi", "width" => 3 }`.
#[macro_export]
macro_rules! kwargs {
    () => {
        $crate::runtime::value::Kwargs::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut kwargs = $crate::runtime::value::Kwargs::new();
        $(kwargs.insert(::std::string::String::from($key), $crate::runtime::value::Value::from($value));)+
        kwargs
    }};
}
