//! Visibility worker over a dedicated web worker.
//!
//! The worker loads this same module and calls [`visibility_worker_main`].
//! Requests travel as JSON strings; results come back as
//! `{ buffer: Float32Array, count }` with the buffer transferred, since the
//! NaN-padded float buffer does not survive JSON.

use std::cell::RefCell;
use std::rc::Rc;

use compute::{VisibilityTransport, VisibilityWorker, WorkerError, WorkerRequest, WorkerResponse};
use js_sys::{Array, Float32Array, Object, Reflect};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
    DedicatedWorkerGlobalScope, ErrorEvent, MessageEvent, Worker, WorkerOptions, WorkerType,
};

type ResultHandler = Rc<RefCell<Box<dyn FnMut(Result<WorkerResponse, WorkerError>)>>>;

pub struct WebWorkerTransport {
    worker: Worker,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_error: Closure<dyn FnMut(ErrorEvent)>,
}

impl WebWorkerTransport {
    /// Starts a module worker from `script_url`; every result or failure is
    /// handed to `on_result` from the browser event loop.
    pub fn spawn(
        script_url: &str,
        on_result: impl FnMut(Result<WorkerResponse, WorkerError>) + 'static,
    ) -> Result<Self, JsValue> {
        let options = WorkerOptions::new();
        options.set_type(WorkerType::Module);
        let worker = Worker::new_with_options(script_url, &options)?;

        let handler: ResultHandler = Rc::new(RefCell::new(Box::new(on_result)));

        let on_message = {
            let handler = Rc::clone(&handler);
            Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
                let result = decode_response(&event.data());
                (handler.borrow_mut())(result);
            })
        };
        let on_error = {
            let handler = Rc::clone(&handler);
            Closure::<dyn FnMut(ErrorEvent)>::new(move |event: ErrorEvent| {
                event.prevent_default();
                (handler.borrow_mut())(Err(WorkerError::Failed(event.message())));
            })
        };
        worker.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
        worker.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        Ok(Self {
            worker,
            _on_message: on_message,
            _on_error: on_error,
        })
    }
}

impl VisibilityTransport for WebWorkerTransport {
    fn post(&mut self, request: WorkerRequest) -> Result<(), WorkerError> {
        let json = serde_json::to_string(&request).map_err(|e| WorkerError::Post(e.to_string()))?;
        self.worker
            .post_message(&JsValue::from_str(&json))
            .map_err(|e| WorkerError::Post(format!("{e:?}")))
    }

    fn terminate(&mut self) {
        self.worker.set_onmessage(None);
        self.worker.set_onerror(None);
        self.worker.terminate();
    }
}

fn decode_response(data: &JsValue) -> Result<WorkerResponse, WorkerError> {
    if let Some(message) = Reflect::get(data, &JsValue::from_str("error"))
        .ok()
        .and_then(|v| v.as_string())
    {
        return Err(WorkerError::Failed(message));
    }
    let buffer = Reflect::get(data, &JsValue::from_str("buffer"))
        .ok()
        .and_then(|v| v.dyn_into::<Float32Array>().ok())
        .ok_or_else(|| WorkerError::Failed("worker reply has no buffer".to_string()))?;
    let count = Reflect::get(data, &JsValue::from_str("count"))
        .ok()
        .and_then(|v| v.as_f64())
        .filter(|c| c.is_finite() && *c >= 0.0)
        .unwrap_or(0.0) as usize;
    Ok(WorkerResponse {
        buffer: buffer.to_vec(),
        count,
    })
}

thread_local! {
    static KERNEL: RefCell<VisibilityWorker> = RefCell::new(VisibilityWorker::new());
}

fn handle_request(data: &JsValue) -> Result<WorkerResponse, String> {
    let json = data
        .as_string()
        .ok_or_else(|| "expected a JSON request string".to_string())?;
    let request: WorkerRequest = serde_json::from_str(&json).map_err(|e| e.to_string())?;
    KERNEL
        .try_with(|k| k.borrow_mut().handle(&request))
        .map_err(|e| e.to_string())
}

fn post_reply(
    scope: &DedicatedWorkerGlobalScope,
    reply: Result<WorkerResponse, String>,
) -> Result<(), JsValue> {
    let message = Object::new();
    match reply {
        Ok(response) => {
            let buffer = Float32Array::from(response.buffer.as_slice());
            Reflect::set(&message, &JsValue::from_str("buffer"), &buffer)?;
            Reflect::set(
                &message,
                &JsValue::from_str("count"),
                &JsValue::from_f64(response.count as f64),
            )?;
            scope.post_message_with_transfer(&message, &Array::of1(&buffer.buffer()))
        }
        Err(error) => {
            Reflect::set(&message, &JsValue::from_str("error"), &JsValue::from_str(&error))?;
            scope.post_message(&message)
        }
    }
}

/// Worker-side entry point: answers visibility requests until terminated.
#[wasm_bindgen]
pub fn visibility_worker_main() -> Result<(), JsValue> {
    let scope: DedicatedWorkerGlobalScope = js_sys::global().dyn_into()?;
    let reply_scope = scope.clone();
    let on_message = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
        let reply = handle_request(&event.data());
        if let Err(err) = post_reply(&reply_scope, reply) {
            web_sys::console::error_1(&JsValue::from_str(&format!(
                "visibility worker reply failed: {:?}",
                err
            )));
        }
    });
    scope.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
    // Lives as long as the worker.
    on_message.forget();
    Ok(())
}
