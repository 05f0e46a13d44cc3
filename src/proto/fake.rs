//! In-memory stand-in for a meter attached to a serial port.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::device::{Connector, SerialIo};
use crate::proto::Result;

type Responder = dyn Fn(&str) -> Option<Vec<u8>> + Send + Sync;

#[derive(Default)]
struct State {
    lines: Vec<String>,
    pending: Vec<u8>,
    rx: VecDeque<u8>,
    reader: Option<Waker>,
    opened: usize,
    closed: usize,
    unplugged: bool,
}

/// Scripted meter. Every complete line written to a port opened through
/// [`FakeMeter::connector`] is recorded and passed to the responder, whose
/// answer (if any) becomes readable on the port.
#[derive(Clone)]
pub(crate) struct FakeMeter {
    state: Arc<Mutex<State>>,
    responder: Arc<Responder>,
}

impl FakeMeter {
    pub fn new(responder: impl Fn(&str) -> Option<Vec<u8>> + Send + Sync + 'static) -> Self {
        Self {
            state: Arc::default(),
            responder: Arc::new(responder),
        }
    }

    /// Meter answering `*IDN?` and `MEAS:SHOW?` with fixed lines.
    pub fn replying(ident: &'static str, value: &'static str) -> Self {
        Self::new(move |line| match line {
            "*IDN?" => Some(format!("{}\n", ident).into_bytes()),
            "MEAS:SHOW?" => Some(format!("{}\r\n", value).into_bytes()),
            _ => None,
        })
    }

    /// Meter that swallows every command.
    pub fn silent() -> Self {
        Self::new(|_| None)
    }

    pub fn connector(&self) -> Box<dyn Connector> {
        Box::new(FakeConnector(self.clone()))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("fake meter state poisoned")
    }

    /// All complete lines written so far, without terminator.
    pub fn lines(&self) -> Vec<String> {
        self.state().lines.clone()
    }

    /// Raw bytes of all complete lines, terminators included.
    pub fn written(&self) -> Vec<u8> {
        self.state()
            .lines
            .iter()
            .flat_map(|l| l.bytes().chain(std::iter::once(b'\n')))
            .collect()
    }

    pub fn count(&self, cmd: &str) -> usize {
        self.state().lines.iter().filter(|l| *l == cmd).count()
    }

    pub fn opened(&self) -> usize {
        self.state().opened
    }

    pub fn closed(&self) -> usize {
        self.state().closed
    }

    /// Makes `bytes` readable on the port without a request, like a reply
    /// that shows up late.
    pub fn push(&self, bytes: &[u8]) {
        let mut state = self.state();
        state.rx.extend(bytes);
        if let Some(waker) = state.reader.take() {
            waker.wake();
        }
    }

    /// Makes every further read or write fail like a vanished USB adapter.
    pub fn unplug(&self) {
        let mut state = self.state();
        state.unplugged = true;
        if let Some(waker) = state.reader.take() {
            waker.wake();
        }
    }
}

struct FakeConnector(FakeMeter);

impl Connector for FakeConnector {
    fn open(&self, _port: &str, _baudrate: u32, _timeout: Duration) -> Result<Box<dyn SerialIo>> {
        let mut state = self.0.state();
        state.opened += 1;
        state.unplugged = false;
        Ok(Box::new(FakePort(self.0.clone())))
    }
}

struct FakePort(FakeMeter);

fn unplugged() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged")
}

impl AsyncRead for FakePort {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut state = self.0.state();
        if state.unplugged {
            return Poll::Ready(Err(unplugged()));
        }
        if state.rx.is_empty() {
            state.reader = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let n = buf.remaining().min(state.rx.len());
        let chunk: Vec<u8> = state.rx.drain(..n).collect();
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for FakePort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.0.state();
        if state.unplugged {
            return Poll::Ready(Err(unplugged()));
        }
        state.pending.extend_from_slice(buf);
        while let Some(n) = state.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = state.pending.drain(..=n).collect();
            let line = String::from_utf8_lossy(&raw[..n]).into_owned();
            if let Some(reply) = (self.0.responder)(&line) {
                state.rx.extend(reply);
                if let Some(waker) = state.reader.take() {
                    waker.wake();
                }
            }
            state.lines.push(line);
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl Drop for FakePort {
    fn drop(&mut self) {
        self.0.state().closed += 1;
    }
}
