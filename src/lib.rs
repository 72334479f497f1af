//! Deserialize JSON request payloads with or without an enclosing root element.
//!
//! Clients usually wrap the data they send under a root key named after the
//! target type:
//!
//! ```json
//! { "order": { "id": 7, "item": "tea" } }
//! ```
//!
//! Some clients send the bare object instead. A [`DeserializationOptions`] built for
//! each request tells the [`Deserialization`] which of the two shapes to expect:
//!
//! ```
//! use rootless::{Deserialization, DeserializationOptions};
//!
//! #[derive(serde::Deserialize)]
//! struct Order {
//!     id: u32,
//! }
//!
//! let mut options = DeserializationOptions::new();
//! options.set_without_root(true);
//!
//! let order: Order = Deserialization::new(options)
//!     .deserialize(br#"{"id": 7}"#, "order")
//!     .unwrap();
//! assert_eq!(order.id, 7);
//! ```
//!
//! A small HTTP [`Server`] is also provided. It reads request bodies, deserializes them
//! with a fresh copy of its options and hands the result to a handler.
use std::future::Future;
use std::io;

use async_trait::async_trait;
use bytes::BytesMut;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task;

pub mod deserialize;
pub mod handlers;
pub mod options;

pub use deserialize::{Deserialization, DeserializeError, root_name};
pub use options::DeserializationOptions;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("incomplete headers have been parsed from request")]
    IncompleteHeaders,
    #[error("failed to parse HTTP request")]
    InvalidRequest(#[from] httparse::Error),
    #[error("failed to read (write) from (to) socket")]
    SocketError(#[from] io::Error),
    #[error("invalid Content-Length header")]
    InvalidContentLength,
    #[error("socket was closed")]
    SocketClosed,
    #[error("failed to complete the assigned request task")]
    TaskError(#[from] task::JoinError),
    #[error("failed to deserialize request payload")]
    Deserialize(#[from] DeserializeError),
}

/// The response sent back for every complete request, before the body is deserialized.
const OK: &str = "HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n";

/// Interim response for clients that send `Expect: 100-continue`.
const CONTINUE: &str = "HTTP/1.1 100 Continue\r\n\r\n";

/// Trait implemented by handlers of deserialized payloads.
#[async_trait]
pub trait Handler<D>
where
    D: DeserializeOwned + std::fmt::Debug + Send + 'static,
{
    async fn handle(self, payload: D);
}

/// A server that deserializes the JSON body of every request it receives.
pub struct Server {
    uri: String,
    options: DeserializationOptions,
    root: Option<String>,
}

impl Default for Server {
    fn default() -> Self {
        Server::new("127.0.0.1:3000")
    }
}

impl Server {
    /// Create a new Server with given URI.
    pub fn new(uri: &str) -> Self {
        Server {
            uri: uri.to_owned(),
            options: DeserializationOptions::default(),
            root: None,
        }
    }

    /// Options every request starts from. Each request gets its own copy.
    pub fn with_options(mut self, options: DeserializationOptions) -> Self {
        self.options = options;
        self
    }

    /// Root key to unwrap, instead of the one derived from the payload type.
    pub fn with_root(mut self, root: &str) -> Self {
        self.root = Some(root.to_owned());
        self
    }

    /// Run the server.
    /// A handler function is taken to process the deserialized payloads.
    pub async fn run<D, U>(
        self,
        handler: impl Fn(D) -> U + Sync + Send + Copy + 'static,
    ) -> Result<(), ServerError>
    where
        D: DeserializeOwned + std::fmt::Debug + Send + 'static,
        U: Future + Send + Sync + 'static,
        U::Output: Send,
    {
        let listener = TcpListener::bind(&self.uri).await?;
        self.serve(listener, handler).await
    }

    /// Like [`Server::run`], on an already bound listener.
    pub async fn serve<D, U>(
        self,
        listener: TcpListener,
        handler: impl Fn(D) -> U + Sync + Send + Copy + 'static,
    ) -> Result<(), ServerError>
    where
        D: DeserializeOwned + std::fmt::Debug + Send + 'static,
        U: Future + Send + Sync + 'static,
        U::Output: Send,
    {
        log::info!("Listening on: {:?}", listener.local_addr());
        let root = self.root.unwrap_or_else(root_name::<D>);

        loop {
            let (socket, addr) = listener.accept().await?;
            log::info!("Accepted: {}", addr);
            let options = self.options;
            let root = root.clone();

            let _ = tokio::spawn(async move {
                log::debug!("Task spawned");

                let payload: D = connection(socket, options, &root).await?;
                handler(payload).await;

                Ok::<(), ServerError>(())
            });
        }
    }

    /// Run the server.
    /// A [`Handler`] is taken to process the deserialized payloads.
    pub async fn run_with_handler<D>(
        self,
        handler: impl Handler<D> + Send + Sync + Clone + 'static,
    ) -> Result<(), ServerError>
    where
        D: DeserializeOwned + std::fmt::Debug + Send + 'static,
    {
        let listener = TcpListener::bind(&self.uri).await?;
        self.serve_with_handler(listener, handler).await
    }

    /// Like [`Server::run_with_handler`], on an already bound listener.
    pub async fn serve_with_handler<D>(
        self,
        listener: TcpListener,
        handler: impl Handler<D> + Send + Sync + Clone + 'static,
    ) -> Result<(), ServerError>
    where
        D: DeserializeOwned + std::fmt::Debug + Send + 'static,
    {
        log::info!("Listening on: {:?}", listener.local_addr());
        let root = self.root.unwrap_or_else(root_name::<D>);

        loop {
            let (socket, addr) = listener.accept().await?;
            log::info!("Accepted: {}", addr);
            // Need to clone as handler will be moved by spawn.
            let this_handler = handler.clone();
            let options = self.options;
            let root = root.clone();

            let _ = tokio::spawn(async move {
                log::debug!("Task spawned");

                let payload: D = connection(socket, options, &root).await?;
                this_handler.handle(payload).await;

                Ok::<(), ServerError>(())
            });
        }
    }
}

/// Read a request from `socket` and deserialize its body with `options`.
async fn connection<D>(
    socket: TcpStream,
    options: DeserializationOptions,
    root: &str,
) -> Result<D, ServerError>
where
    D: DeserializeOwned,
{
    let buf = process(socket).await.inspect_err(|e| log::error!("{}", e))?;

    Deserialization::new(options)
        .deserialize(&buf, root)
        .map_err(|e| {
            log::error!("Failed to deserialize JSON body: {}", e);
            ServerError::from(e)
        })
}

/// Where a request's body starts and how long it is.
#[derive(Debug, PartialEq, Eq)]
pub struct RequestHead {
    /// Length of the request line and headers, including the blank line.
    pub len: usize,
    /// Declared `Content-Length`, if any.
    pub content_length: Option<usize>,
    /// Whether the client waits for `100 Continue` before sending the body.
    pub expect_continue: bool,
}

/// Process a TcpStream.
/// Reads until the headers and the declared body have arrived, acknowledges
/// the request and returns its body.
pub async fn process(mut socket: TcpStream) -> Result<BytesMut, ServerError> {
    if let Err(e) = socket.readable().await {
        log::error!("socket is not readable");
        return Err(ServerError::from(e));
    };

    let mut buf = BytesMut::with_capacity(122880);
    let mut head: Option<RequestHead> = None;

    loop {
        if let Some(h) = &head {
            match h.content_length {
                Some(len) if buf.len() < h.len.saturating_add(len) => {}
                _ => break,
            }
        }

        let n = match socket.read_buf(&mut buf).await {
            Ok(0) if head.is_none() => {
                log::debug!("Socket closed");
                return Err(if buf.is_empty() {
                    ServerError::SocketClosed
                } else {
                    ServerError::IncompleteHeaders
                });
            }
            Ok(0) => {
                log::debug!("Socket closed before the whole body was read");
                return Err(ServerError::SocketClosed);
            }
            Ok(n) => n,
            Err(e) => {
                log::error!("failed to read from socket");
                return Err(ServerError::from(e));
            }
        };
        log::debug!("Read: {}", n);

        if head.is_none() {
            head = parse_head(&buf)?;
            if let Some(h) = &head {
                if h.expect_continue && buf.len() == h.len {
                    log::debug!("Sending 100 Continue");
                    socket.write_all(CONTINUE.as_bytes()).await?;
                }
            }
        }
    }

    if let Err(e) = socket.write_all(OK.as_bytes()).await {
        log::error!("failed to write to socket");
        return Err(ServerError::from(e));
    };

    log::debug!("Raw request: {:?}", buf);
    let Some(head) = head else {
        return Err(ServerError::IncompleteHeaders);
    };

    let _ = buf.split_to(head.len);
    if let Some(len) = head.content_length {
        buf.truncate(len);
    }
    log::debug!("Raw body: {:?}", buf);

    Ok(buf)
}

/// Parse the HTTP request headers.
/// The headers themselves are ignored; parsing only validates them and finds
/// where the body begins. `None` means the headers are not complete yet.
pub fn parse_headers(buf: &[u8]) -> Result<Option<usize>, ServerError> {
    Ok(parse_head(buf)?.map(|head| head.len))
}

/// Parse the HTTP request headers, keeping the ones that decide how much
/// body is left to read.
pub fn parse_head(buf: &[u8]) -> Result<Option<RequestHead>, ServerError> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut r = httparse::Request::new(&mut headers);

    let len = match r.parse(buf)? {
        httparse::Status::Complete(amt) => amt,
        httparse::Status::Partial => return Ok(None),
    };

    let mut content_length = None;
    let mut expect_continue = false;
    for header in r.headers.iter() {
        if header.name.eq_ignore_ascii_case("content-length") {
            let value = std::str::from_utf8(header.value)
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .ok_or(ServerError::InvalidContentLength)?;
            content_length = Some(value);
        } else if header.name.eq_ignore_ascii_case("expect") {
            expect_continue = header.value.eq_ignore_ascii_case(b"100-continue");
        }
    }

    Ok(Some(RequestHead {
        len,
        content_length,
        expect_continue,
    }))
}
