//! Values flowing between stages

use crate::core::OperationKind;
use crate::error::{EngineError, Result};

/// The value a stage hands to the next one
///
/// Most stages produce a sequence. FIND/FIND_LAST/MAX/MIN/REDUCE collapse it
/// to a single item, COUNT to a number, and FOR_EACH to nothing at all.
#[derive(Debug, Clone, PartialEq)]
pub enum Output<T> {
    Items(Vec<T>),
    Item(Option<T>),
    Count(usize),
    Void,
}

impl<T> Default for Output<T> {
    fn default() -> Self {
        Output::Items(Vec::new())
    }
}

impl<T> Output<T> {
    pub fn variant_name(&self) -> &'static str {
        match self {
            Output::Items(_) => "sequence",
            Output::Item(_) => "single item",
            Output::Count(_) => "count",
            Output::Void => "nothing",
        }
    }

    /// Borrow the value as the input sequence of a `kind` stage.
    ///
    /// `Void` reads as an empty sequence.
    pub fn as_sequence(&self, kind: OperationKind) -> Result<&[T]> {
        match self {
            Output::Items(items) => Ok(items),
            Output::Void => Ok(&[]),
            other => Err(EngineError::NotASequence {
                kind,
                found: other.variant_name(),
            }),
        }
    }

    /// Take the value as a sequence, with the same rules as [`Output::as_sequence`]
    pub fn into_sequence(self, kind: OperationKind) -> Result<Vec<T>> {
        match self {
            Output::Items(items) => Ok(items),
            Output::Void => Ok(Vec::new()),
            other => Err(EngineError::NotASequence {
                kind,
                found: other.variant_name(),
            }),
        }
    }

    pub fn items(self) -> Option<Vec<T>> {
        match self {
            Output::Items(items) => Some(items),
            _ => None,
        }
    }

    pub fn item(self) -> Option<T> {
        match self {
            Output::Item(item) => item,
            _ => None,
        }
    }

    pub fn count(&self) -> Option<usize> {
        match self {
            Output::Count(n) => Some(*n),
            _ => None,
        }
    }
}
