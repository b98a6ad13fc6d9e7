//! `(code, payload)` envelope returned by every task.

use std::fmt;

use crate::error::ModelError;
use crate::status::ScanStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum ReturnCode {
    Success = 0,
    Warning = 1,
    Error = -1,
}

impl ReturnCode {
    pub const fn code(self) -> i8 {
        self as i8
    }

    pub fn from_code(code: i8) -> Result<Self, ModelError> {
        match code {
            0 => Ok(ReturnCode::Success),
            1 => Ok(ReturnCode::Warning),
            -1 => Ok(ReturnCode::Error),
            other => Err(ModelError::UnknownReturnCode(other)),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReturnCode::Success => "success",
            ReturnCode::Warning => "warning",
            ReturnCode::Error => "error",
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of a task as seen by the caller.
///
/// Warnings always carry the scan status that prevented the operation;
/// errors carry a human readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskReturn<T> {
    Success(T),
    Warning(ScanStatus),
    Error(String),
}

impl<T> TaskReturn<T> {
    pub fn success(payload: T) -> Self {
        TaskReturn::Success(payload)
    }

    pub fn warning(status: ScanStatus) -> Self {
        TaskReturn::Warning(status)
    }

    pub fn error(message: impl Into<String>) -> Self {
        TaskReturn::Error(message.into())
    }

    pub fn code(&self) -> ReturnCode {
        match self {
            TaskReturn::Success(_) => ReturnCode::Success,
            TaskReturn::Warning(_) => ReturnCode::Warning,
            TaskReturn::Error(_) => ReturnCode::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskReturn::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TaskReturn<U> {
        match self {
            TaskReturn::Success(payload) => TaskReturn::Success(f(payload)),
            TaskReturn::Warning(status) => TaskReturn::Warning(status),
            TaskReturn::Error(message) => TaskReturn::Error(message),
        }
    }

    pub fn success_payload(self) -> Option<T> {
        match self {
            TaskReturn::Success(payload) => Some(payload),
            _ => None,
        }
    }
}

#[cfg(feature = "serde")]
mod wire {
    use std::marker::PhantomData;

    use serde::de::{self, DeserializeOwned, SeqAccess, Visitor};
    use serde::ser::SerializeTuple;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{ReturnCode, TaskReturn};
    use crate::status::ScanStatus;

    impl<T: Serialize> Serialize for TaskReturn<T> {
        fn serialize<S: Serializer>(
            &self,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            let mut tuple = serializer.serialize_tuple(2)?;
            tuple.serialize_element(&self.code().code())?;
            match self {
                TaskReturn::Success(payload) => tuple.serialize_element(payload)?,
                TaskReturn::Warning(status) => tuple.serialize_element(status)?,
                TaskReturn::Error(message) => tuple.serialize_element(message)?,
            }
            tuple.end()
        }
    }

    impl<'de, T: DeserializeOwned> Deserialize<'de> for TaskReturn<T> {
        fn deserialize<D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Self, D::Error> {
            deserializer.deserialize_tuple(2, EnvelopeVisitor(PhantomData))
        }
    }

    struct EnvelopeVisitor<T>(PhantomData<T>);

    impl<'de, T: DeserializeOwned> Visitor<'de> for EnvelopeVisitor<T> {
        type Value = TaskReturn<T>;

        fn expecting(
            &self,
            formatter: &mut std::fmt::Formatter<'_>,
        ) -> std::fmt::Result {
            formatter.write_str("a [code, payload] pair")
        }

        fn visit_seq<A: SeqAccess<'de>>(
            self,
            mut seq: A,
        ) -> Result<Self::Value, A::Error> {
            let code: i8 = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(0, &self))?;
            let code = ReturnCode::from_code(code).map_err(de::Error::custom)?;
            let envelope = match code {
                ReturnCode::Success => TaskReturn::Success(
                    seq.next_element::<T>()?
                        .ok_or_else(|| de::Error::invalid_length(1, &self))?,
                ),
                ReturnCode::Warning => TaskReturn::Warning(
                    seq.next_element::<ScanStatus>()?
                        .ok_or_else(|| de::Error::invalid_length(1, &self))?,
                ),
                ReturnCode::Error => TaskReturn::Error(
                    seq.next_element::<String>()?
                        .ok_or_else(|| de::Error::invalid_length(1, &self))?,
                ),
            };
            Ok(envelope)
        }
    }
}
