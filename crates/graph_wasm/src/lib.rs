//! Browser entry point. A web worker owns one `WasmEngine` and forwards every
//! `postMessage` payload to `handle_message`.

use graph_core::protocol::Response;
use graph_core::Dispatcher;
use js_sys::Array;
use serde::Serialize;
use serde_json::Value;
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmEngine {
    dispatcher: Dispatcher<graph_core::equation_engine::BytecodeCompiler>,
}

#[wasm_bindgen]
impl WasmEngine {
    #[wasm_bindgen(constructor)]
    pub fn new() -> WasmEngine {
        console_error_panic_hook::set_once();
        WasmEngine {
            dispatcher: Dispatcher::default(),
        }
    }

    /// Returns the response object, or `undefined` for messages that are not
    /// engine requests.
    pub fn handle_message(&self, message: JsValue) -> Result<JsValue, JsValue> {
        let message: Value = from_value(message)
            .map_err(|e| JsValue::from_str(&format!("Invalid message: {}", e)))?;
        match self.dispatcher.handle(&message) {
            Some(response) => to_js(&response),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// Handles several messages in order, skipping the ones that produce no
    /// response.
    pub fn handle_batch(&self, messages: Array) -> Result<Array, JsValue> {
        let responses = Array::new();
        for message in messages.iter() {
            let response = self.handle_message(message)?;
            if !response.is_undefined() {
                responses.push(&response);
            }
        }
        Ok(responses)
    }
}

impl Default for WasmEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot variant of [`WasmEngine::handle_message`].
#[wasm_bindgen]
pub fn handle_message(message: JsValue) -> Result<JsValue, JsValue> {
    WasmEngine::new().handle_message(message)
}

// Plain objects and `null` for gaps, rather than `Map`s and `undefined`.
fn to_js(response: &Response) -> Result<JsValue, JsValue> {
    response
        .serialize(&Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}
