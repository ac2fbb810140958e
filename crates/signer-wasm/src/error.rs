//! JavaScript-friendly error types for WASM bindings.
//!
//! Errors cross into JavaScript as `Error` objects. When the chip gave a
//! reason code, it is attached as the `errorName` property, spelled the way
//! the chip spells it (`ERROR_CODE_WRONG_PWD`, ...), so callers can branch on
//! it without parsing messages.
//!
//! # Example
//!
//! ```ignore
//! use halo_evm_signer_wasm::error::WasmError;
//!
//! // Errors returned from async bindings become rejected promises
//! async fn connect() -> Result<(), WasmError> {
//!     Err(WasmError::InvalidArgument("keyNo must be at least 1".to_string()))
//! }
//! ```

use std::{error, fmt};

use halo_evm_signer_core::error::{ChipErrorCode, Error as CoreError};
use js_sys::{Error as JsError, Reflect};
use wasm_bindgen::prelude::*;

/// Error type for WASM operations.
#[derive(Debug)]
pub enum WasmError {
    /// An argument passed from JavaScript could not be used.
    InvalidArgument(String),

    /// Core library error.
    Core(CoreError),

    /// A JavaScript callback threw or returned something unusable.
    JsError(String),
}

impl WasmError {
    /// Returns the chip reason code behind the error, if any.
    #[must_use]
    pub fn reason_code(&self) -> Option<ChipErrorCode> {
        match self {
            Self::Core(error) => error.reason_code(),
            Self::InvalidArgument(_) | Self::JsError(_) => None,
        }
    }
}

impl fmt::Display for WasmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            Self::Core(error) => write!(f, "{error}"),
            Self::JsError(msg) => write!(f, "JavaScript error: {msg}"),
        }
    }
}

impl error::Error for WasmError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Core(error) => Some(error),
            Self::InvalidArgument(_) | Self::JsError(_) => None,
        }
    }
}

impl From<WasmError> for JsValue {
    fn from(error: WasmError) -> Self {
        let js_error = JsError::new(&error.to_string());
        if let Some(code) = error.reason_code() {
            let name = format!("ERROR_CODE_{code}");
            // Setting a property on a fresh Error object cannot fail.
            let _ = Reflect::set(&js_error, &"errorName".into(), &name.into());
        }
        js_error.into()
    }
}

impl From<CoreError> for WasmError {
    fn from(error: CoreError) -> Self {
        Self::Core(error)
    }
}

impl From<JsValue> for WasmError {
    fn from(value: JsValue) -> Self {
        Self::JsError(js_message(&value))
    }
}

/// Extracts a readable message from a thrown JavaScript value.
pub(crate) fn js_message(value: &JsValue) -> String {
    if let Some(s) = value.as_string() {
        s
    } else if let Some(err) = value.dyn_ref::<JsError>() {
        err.message().into()
    } else {
        format!("{value:?}")
    }
}

/// Result type for WASM operations.
pub type WasmResult<T> = Result<T, WasmError>;


#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use halo_evm_signer_core::error::ChipError;
    use wasm_bindgen_test::wasm_bindgen_test;

    use super::*;

    #[wasm_bindgen_test]
    fn reason_code_becomes_error_name() {
        let error = WasmError::Core(CoreError::Protocol {
            command: "sign",
            cause: ChipError::from_name("ERROR_CODE_WRONG_PWD", "wrong password"),
        });

        let value = JsValue::from(error);

        let name = Reflect::get(&value, &"errorName".into()).unwrap();
        assert_eq!(name.as_string().as_deref(), Some("ERROR_CODE_WRONG_PWD"));
        assert!(js_message(&value).contains("wrong password"));
    }

    #[wasm_bindgen_test]
    fn argument_errors_carry_no_error_name() {
        let value = JsValue::from(WasmError::InvalidArgument("keyNo".to_string()));

        let name = Reflect::get(&value, &"errorName".into()).unwrap();
        assert!(name.is_undefined());
    }
}
