//! JavaScript collaborators.
//!
//! [`JsChip`] adapts a JavaScript command executor, any function taking a
//! command object and returning its response (or a promise of it), such as
//! libhalo's `execHaloCmdWeb`. [`JsPasswordPrompt`] adapts a function that
//! returns a password string, `null` or `undefined`, or a promise of one.
//!
//! Values cross the boundary as JSON.

use std::fmt;

use async_trait::async_trait;
use halo_evm_signer_core::error::{ChipError, Error as CoreError, Result as CoreResult};
use halo_evm_signer_core::halo::{Chip, Command, Password, PasswordPrompt};
use js_sys::{Function, JSON, Promise, Reflect};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::error::{WasmError, WasmResult, js_message};

/// A chip reached through a JavaScript command executor.
pub struct JsChip {
    execute: Function,
}

impl fmt::Debug for JsChip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsChip").finish_non_exhaustive()
    }
}

impl JsChip {
    /// Wraps `execute(command) -> response | Promise<response>`.
    #[must_use]
    pub const fn new(execute: Function) -> Self {
        Self { execute }
    }
}

#[async_trait(?Send)]
impl Chip for JsChip {
    async fn execute(&self, command: &Command) -> Result<Value, ChipError> {
        let record = to_js(&command.to_json()).map_err(|e| ChipError::new(None, e.to_string()))?;

        let returned = self
            .execute
            .call1(&JsValue::NULL, &record)
            .map_err(|e| chip_failure(&e))?;
        let response = JsFuture::from(Promise::resolve(&returned))
            .await
            .map_err(|e| chip_failure(&e))?;

        from_js(&response).map_err(|e| ChipError::new(None, e.to_string()))
    }
}

/// A password prompt backed by a JavaScript function.
///
/// Without a function, every prompt answers "no password". A prompt that
/// throws or rejects fails the operation with the thrown message.
pub struct JsPasswordPrompt {
    prompt: Option<Function>,
}

impl fmt::Debug for JsPasswordPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsPasswordPrompt")
            .field("has_prompt", &self.prompt.is_some())
            .finish()
    }
}

impl JsPasswordPrompt {
    /// Wraps `prompt() -> string | null | Promise<string | null>`.
    #[must_use]
    pub const fn new(prompt: Option<Function>) -> Self {
        Self { prompt }
    }
}

#[async_trait(?Send)]
impl PasswordPrompt for JsPasswordPrompt {
    async fn prompt_password(&self) -> CoreResult<Option<Password>> {
        let Some(prompt) = self.prompt.as_ref() else {
            return Ok(None);
        };
        let returned = prompt.call0(&JsValue::NULL).map_err(|e| prompt_failure(&e))?;
        let answer = JsFuture::from(Promise::resolve(&returned))
            .await
            .map_err(|e| prompt_failure(&e))?;

        if answer.is_null() || answer.is_undefined() {
            return Ok(None);
        }
        answer
            .as_string()
            .map(|password| Some(Password::new(password)))
            .ok_or_else(|| CoreError::PasswordPrompt("prompt returned a non-string".to_string()))
    }
}

/// Builds a [`ChipError`] from a thrown value, reading libhalo's `errorName`.
fn chip_failure(thrown: &JsValue) -> ChipError {
    let message = js_message(thrown);
    let name = ["errorName", "name"]
        .into_iter()
        .filter_map(|key| Reflect::get(thrown, &key.into()).ok())
        .find_map(|value| value.as_string());

    match name {
        Some(name) => ChipError::from_name(&name, message),
        None => ChipError::new(None, message),
    }
}

fn prompt_failure(thrown: &JsValue) -> CoreError {
    CoreError::PasswordPrompt(js_message(thrown))
}

/// Converts a JSON value into a JavaScript value.
pub(crate) fn to_js(value: &Value) -> WasmResult<JsValue> {
    JSON::parse(&value.to_string()).map_err(WasmError::from)
}

/// Converts a JavaScript value into JSON.
///
/// `undefined` becomes `null`.
pub(crate) fn from_js(value: &JsValue) -> WasmResult<Value> {
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    let text: String = JSON::stringify(value).map_err(WasmError::from)?.into();
    serde_json::from_str(&text).map_err(|e| WasmError::JsError(e.to_string()))
}
