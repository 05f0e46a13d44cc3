use futures::{FutureExt, SinkExt, StreamExt};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, StopBits};
use tokio_util::codec::{Decoder, Framed};

use super::measurement::Reading;
use super::proto::{
    codec::{ProtocolCodec, MAX_LINE_LEN},
    command::{Command, Mode},
    response::{Ident, Response},
    ProtoError,
};
use crate::proto::Result;

/// Byte channel to the meter.
pub trait SerialIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> SerialIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Opens byte channels to the meter.
pub trait Connector: Send + Sync {
    fn open(&self, port: &str, baudrate: u32, timeout: Duration) -> Result<Box<dyn SerialIo>>;
}

/// Opens real serial ports, 8N1.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    fn open(&self, port: &str, baudrate: u32, timeout: Duration) -> Result<Box<dyn SerialIo>> {
        #[allow(unused_mut)]
        let mut port = tokio_serial::new(port, baudrate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(timeout)
            .open_native_async()?;

        #[cfg(unix)]
        port.set_exclusive(false)?;

        Ok(Box::new(port))
    }
}

/// Timing of the serial link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Longest time to wait for a response line
    pub timeout: Duration,
    /// Pause after a configuration command before the meter delivers reliable readings
    pub settle: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            settle: Duration::from_millis(100),
        }
    }
}

type Stream = Framed<Box<dyn SerialIo>, ProtocolCodec>;

/// Link to a single meter.
///
/// Holds at most one open serial channel. Every operation is a complete
/// write-then-read transaction, so a `Device` must not be shared between
/// callers without a lock around it.
pub struct Device {
    connector: Box<dyn Connector>,
    config: LinkConfig,
    stream: Option<Stream>,
    port: Option<String>,
    mode: Option<Mode>,
}

impl Default for Device {
    fn default() -> Self {
        Self::new(LinkConfig::default())
    }
}

impl Device {
    pub fn new(config: LinkConfig) -> Self {
        Self::with_connector(config, Box::new(SerialConnector))
    }

    pub fn with_connector(config: LinkConfig, connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            config,
            stream: None,
            port: None,
            mode: None,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Port of the open channel.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Function last requested through [`Device::configure`].
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    /// Open the serial channel, failing with [`ProtoError::AlreadyOpen`]
    /// if a channel is open already.
    pub async fn open(&mut self, port: &str, baudrate: u32) -> Result<()> {
        if self.stream.is_some() {
            return Err(ProtoError::AlreadyOpen);
        }

        let io = self.connector.open(port, baudrate, self.config.timeout)?;
        self.stream = Some(ProtocolCodec.framed(io));
        self.port = Some(port.to_string());
        self.mode = None;
        info!("Serial port {} opened at {} baud", port, baudrate);
        Ok(())
    }

    /// Open the serial channel. Connecting an open device succeeds
    /// without touching the existing channel.
    pub async fn connect(&mut self, port: &str, baudrate: u32) -> Result<()> {
        match self.open(port, baudrate).await {
            Err(ProtoError::AlreadyOpen) => {
                info!("Serial port {} is already open", self.port().unwrap_or(port));
                Ok(())
            }
            res => res,
        }
    }

    /// Close the serial channel. Closing a closed device is a no-op.
    pub async fn disconnect(&mut self) -> Result<()> {
        let port = self.port.take();
        self.mode = None;
        match self.stream.take() {
            Some(mut stream) => {
                // Dropped regardless of the outcome, the device is closed afterwards.
                let res = stream.close().await;
                info!("Serial port {} closed", port.as_deref().unwrap_or("?"));
                res.map_err(ProtoError::from)
            }
            None => {
                info!("Serial port is not open");
                Ok(())
            }
        }
    }

    /// Query device identification
    pub async fn query_identity(&mut self) -> Result<String> {
        self.query(Command::Id).await
    }

    /// Query device identification, split into its fields
    pub async fn ident(&mut self) -> Result<Ident> {
        self.query_identity().await?.parse()
    }

    /// Select measurement function
    ///
    /// The meter does not acknowledge configuration commands. After writing
    /// the command this waits for the configured settling period.
    pub async fn configure(&mut self, mode: Mode) -> Result<()> {
        self.send(Command::Configure(mode)).await?;
        self.mode = Some(mode);
        if !self.config.settle.is_zero() {
            debug!("settling for {} ms", self.config.settle.as_millis());
            tokio::time::sleep(self.config.settle).await;
        }
        Ok(())
    }

    /// Get current measurement as reported by the meter
    pub async fn measure(&mut self) -> Result<String> {
        self.query(Command::Measure).await
    }

    /// Get current measurement, tagged with the configured function
    pub async fn reading(&mut self) -> Result<Reading> {
        let value = self.measure().await?;
        Ok(Reading::new(value, self.mode))
    }

    async fn send(&mut self, cmd: Command) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(ProtoError::NotConnected)?;
        debug!("send: {}", cmd);
        let res = stream.send(cmd).await.map_err(ProtoError::from);
        self.check(res)
    }

    async fn query(&mut self, cmd: Command) -> Result<String> {
        self.discard_input()?;
        self.send(cmd).await?;
        let timeout = self.config.timeout;
        let stream = self.stream.as_mut().ok_or(ProtoError::NotConnected)?;
        let res = match tokio::time::timeout(timeout, stream.next()).await {
            Ok(Some(Ok(Response::Line(line)))) => {
                debug!("recv: {}", line);
                Ok(line)
            }
            Ok(Some(Ok(Response::Overflow(len)))) => Err(ProtoError::MalformedResponse(format!(
                "line longer than {} bytes, discarded {} bytes",
                MAX_LINE_LEN, len
            ))),
            Ok(Some(Err(ioerr))) => Err(ioerr.into()),
            Ok(None) => Err(ProtoError::Abort),
            Err(_) => Err(ProtoError::Timeout(timeout)),
        };
        self.check(res)
    }

    /// Throw away input that arrived outside of a transaction, e.g. a reply
    /// that showed up after its request timed out. Does not wait for data.
    fn discard_input(&mut self) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(ProtoError::NotConnected)?;
        let res = loop {
            match stream.next().now_or_never() {
                Some(Some(Ok(Response::Line(line)))) => debug!("discard: {}", line),
                Some(Some(Ok(Response::Overflow(len)))) => debug!("discard: {} bytes", len),
                Some(Some(Err(ioerr))) => break Err(ioerr.into()),
                Some(None) => break Err(ProtoError::Abort),
                None => break Ok(()),
            }
        };
        let buf = stream.read_buffer_mut();
        if !buf.is_empty() {
            debug!("discard: {} bytes of a partial line", buf.len());
            buf.clear();
        }
        self.check(res)
    }

    /// Drop the channel after errors that leave it unusable.
    fn check<T>(&mut self, res: Result<T>) -> Result<T> {
        if let Err(err) = &res {
            if err.is_fatal() {
                warn!(
                    "Closing serial port {} after error: {}",
                    self.port.as_deref().unwrap_or("?"),
                    err
                );
                self.stream = None;
                self.port = None;
                self.mode = None;
            }
        }
        res
    }
}
