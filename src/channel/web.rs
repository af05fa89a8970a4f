//! Browser `WebSocket` transport.

use std::{cell::RefCell, rc::Rc};

use wasm_bindgen::{JsCast, JsValue, prelude::Closure};
use web_sys::{
    BinaryType, CloseEvent, ErrorEvent, MessageEvent, WebSocket,
    js_sys::{ArrayBuffer, Uint8Array},
};

use super::{ChannelError, ChannelEvent, ConnectionMachine, ReconnectPolicy, decode_binary};

type Sink = Rc<dyn Fn(ChannelEvent) -> bool>;

struct Socket {
    websocket: WebSocket,
    _on_open: Closure<dyn FnMut()>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_error: Closure<dyn FnMut(ErrorEvent)>,
    _on_close: Closure<dyn FnMut(CloseEvent)>,
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.websocket.set_onopen(None);
        self.websocket.set_onmessage(None);
        self.websocket.set_onerror(None);
        self.websocket.set_onclose(None);
        let _ = self.websocket.close();
    }
}

struct Shared {
    url: String,
    machine: ConnectionMachine,
    sink: Sink,
    socket: Option<Socket>,
    stopped: bool,
}

/// Keeps the connection (and the reconnect timer) alive until dropped.
pub struct WebChannel {
    shared: Rc<RefCell<Shared>>,
}

impl std::fmt::Debug for WebChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WebChannel")
    }
}

impl WebChannel {
    pub fn connect<F>(url: String, policy: ReconnectPolicy, sink: F) -> Self
    where
        F: Fn(ChannelEvent) -> bool + 'static,
    {
        let shared = Rc::new(RefCell::new(Shared {
            url,
            machine: ConnectionMachine::new(policy),
            sink: Rc::new(sink),
            socket: None,
            stopped: false,
        }));
        open(&shared);
        Self { shared }
    }
}

impl Drop for WebChannel {
    fn drop(&mut self) {
        let socket = {
            let mut shared = self.shared.borrow_mut();
            shared.stopped = true;
            shared.socket.take()
        };
        drop(socket);
    }
}

fn emit(shared: &Rc<RefCell<Shared>>, event: ChannelEvent) {
    let sink = shared.borrow().sink.clone();
    if !sink(event) {
        shared.borrow_mut().stopped = true;
    }
}

fn open(shared: &Rc<RefCell<Shared>>) {
    let url = shared.borrow().url.clone();
    log::debug!("Connecting to {}", url);
    let websocket = match WebSocket::new(&url) {
        Ok(websocket) => websocket,
        Err(e) => {
            shared.borrow_mut().machine.on_error();
            emit(shared, ChannelEvent::Error(ChannelError::Connect(js_error(&e))));
            schedule_retry(shared);
            return;
        }
    };
    websocket.set_binary_type(BinaryType::Arraybuffer);

    let weak = Rc::downgrade(shared);
    let on_open = Closure::new({
        let weak = weak.clone();
        move || {
            let Some(shared) = weak.upgrade() else { return };
            let url = {
                let mut shared = shared.borrow_mut();
                shared.machine.on_open();
                shared.url.clone()
            };
            emit(&shared, ChannelEvent::Opened { url });
        }
    });
    let on_message = Closure::new({
        let weak = weak.clone();
        move |message: MessageEvent| {
            let Some(shared) = weak.upgrade() else { return };
            let data = message.data();
            let text = if let Some(text) = data.as_string() {
                text
            } else if let Ok(buffer) = data.dyn_into::<ArrayBuffer>() {
                decode_binary(&Uint8Array::new(&buffer).to_vec())
            } else {
                log::warn!("Ignoring message of unsupported type");
                return;
            };
            emit(&shared, ChannelEvent::Message(text));
        }
    });
    let on_error = Closure::new({
        let weak = weak.clone();
        move |_: ErrorEvent| {
            let Some(shared) = weak.upgrade() else { return };
            shared.borrow_mut().machine.on_error();
            emit(
                &shared,
                ChannelEvent::Error(ChannelError::Transport("WebSocket error".to_string())),
            );
        }
    });
    let on_close = Closure::new(move |event: CloseEvent| {
        let Some(shared) = weak.upgrade() else { return };
        shared.borrow_mut().machine.on_close();
        let reason = Some(format!("{} {}", event.code(), event.reason()));
        emit(&shared, ChannelEvent::Closed { reason });
        schedule_retry(&shared);
    });

    websocket.set_onopen(Some(on_open.as_ref().unchecked_ref()));
    websocket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
    websocket.set_onerror(Some(on_error.as_ref().unchecked_ref()));
    websocket.set_onclose(Some(on_close.as_ref().unchecked_ref()));

    // Replacing the previous socket happens from the retry timer, never from
    // inside one of its own handlers.
    shared.borrow_mut().socket = Some(Socket {
        websocket,
        _on_open: on_open,
        _on_message: on_message,
        _on_error: on_error,
        _on_close: on_close,
    });
}

fn schedule_retry(shared: &Rc<RefCell<Shared>>) {
    let (attempt, delay) = {
        let mut shared = shared.borrow_mut();
        if shared.stopped {
            return;
        }
        let Some(delay) = shared.machine.next_retry() else {
            log::debug!("Not reconnecting to {}", shared.url);
            return;
        };
        (shared.machine.attempt(), delay)
    };
    emit(shared, ChannelEvent::Reconnecting { attempt, delay });

    let weak = Rc::downgrade(shared);
    let callback = Closure::once_into_js(move || {
        let Some(shared) = weak.upgrade() else { return };
        if shared.borrow().stopped {
            return;
        }
        shared.borrow_mut().machine.on_retry();
        open(&shared);
    });
    let Some(window) = web_sys::window() else {
        log::error!("No window to schedule the reconnect on");
        return;
    };
    if let Err(e) = window.set_timeout_with_callback_and_timeout_and_arguments_0(
        callback.unchecked_ref(),
        delay.as_millis().min(i32::MAX as u128) as i32,
    ) {
        log::error!("Could not schedule the reconnect: {}", js_error(&e));
    }
}

fn js_error(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{:?}", value))
}
