//! Three-way operation outcome
//!
//! `NotFound` is an answer, not a fault: callers must be able to tell
//! "nothing there" apart from "something went wrong".

use crate::error::{StoreError, StoreResult};

#[derive(Debug)]
pub enum Outcome<T> {
    Data(T),
    NoData,
    Error(StoreError),
}

impl<T> Outcome<T> {
    pub fn is_data(&self) -> bool {
        matches!(self, Outcome::Data(_))
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Outcome::NoData)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Data(value) => Outcome::Data(f(value)),
            Outcome::NoData => Outcome::NoData,
            Outcome::Error(err) => Outcome::Error(err),
        }
    }

    /// `Some(value)` for data, `None` for no data
    pub fn into_result(self) -> StoreResult<Option<T>> {
        match self {
            Outcome::Data(value) => Ok(Some(value)),
            Outcome::NoData => Ok(None),
            Outcome::Error(err) => Err(err),
        }
    }
}

impl<T> From<StoreResult<T>> for Outcome<T> {
    fn from(result: StoreResult<T>) -> Self {
        match result {
            Ok(value) => Outcome::Data(value),
            Err(err) if err.is_not_found() => Outcome::NoData,
            Err(err) => Outcome::Error(err),
        }
    }
}
