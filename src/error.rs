//! Primary error type used by the library

use alloc::string::FromUtf8Error;
use alloc::string::String;
use alloc::borrow::ToOwned;
use alloc::string::ToString;

/// The error type used for errors in this library
#[derive(Debug, Clone, PartialEq)]
pub enum ZP_Error {
    /// Destination buffer can't hold the encoded message, retry with a larger one
    BufferTooSmall,
    /// Message can't be encoded inside the maximum buffer size
    ObjectTooLarge,
    /// Schema bundle failed structural validation
    MalformedBundle,
    /// Wire data failed structural validation
    MalformedInput,
    /// Read past the end of a buffer
    OutOfBounds,
    /// Too many recursive calls
    RecursionLimit,
    /// Use this instead of unreachable! which causes panic
    Unreachable,
    /// Custom error message
    Custom {
        /// Error message
        message: String
    }
}

impl ZP_Error {
    /// Generate a new error with a specific message
    pub fn new<S: AsRef<str>>(message: S) -> Self {
        ZP_Error::Custom { message: message.as_ref().to_owned() }
    }
    /// Convert an option to an error type
    pub fn unwrap<T>(value: Option<T>) -> Result<T, ZP_Error> {
        match value {
            Some(x) => Ok(x),
            None => Err(ZP_Error::new("Missing Value in option!"))
        }
    }
}

impl From<FromUtf8Error> for ZP_Error {
    fn from(err: FromUtf8Error) -> ZP_Error {
        ZP_Error::new(err.to_string().as_str())
    }
}
