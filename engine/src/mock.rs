//! In-memory transport for tests and offline use.

use crate::transport::{RawResponse, Request, Transport, TransportError};
use futures::future::{self, FutureExt, LocalBoxFuture};
use std::cell::RefCell;
use std::rc::Rc;

type Handler = Box<dyn FnMut(&Request) -> Result<RawResponse, TransportError>>;

/// A [`Transport`] answering from a closure and recording every request.
///
/// Clones share the handler and the request log.
#[derive(Clone)]
pub struct MockTransport {
    host: String,
    handler: Rc<RefCell<Handler>>,
    requests: Rc<RefCell<Vec<Request>>>,
}

impl MockTransport {
    pub fn new(
        handler: impl FnMut(&Request) -> Result<RawResponse, TransportError> + 'static,
    ) -> Self {
        Self {
            host: "mock://api".to_string(),
            handler: Rc::new(RefCell::new(Box::new(handler))),
            requests: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Swap the handler; the request log is kept.
    pub fn respond_with(
        &self,
        handler: impl FnMut(&Request) -> Result<RawResponse, TransportError> + 'static,
    ) {
        *self.handler.borrow_mut() = Box::new(handler);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.requests.borrow().last().cloned()
    }
}

impl Transport for MockTransport {
    fn host(&self) -> &str {
        &self.host
    }

    fn send(&self, request: Request) -> LocalBoxFuture<'static, Result<RawResponse, TransportError>> {
        let response = (&mut *self.handler.borrow_mut())(&request);
        self.requests.borrow_mut().push(request);
        future::ready(response).boxed_local()
    }
}
