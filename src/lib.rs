//!
//! This library provides communication with an OWON XDM1041/XDM1042 digital multimeter.
//!
//! <br>
//!
//! # Details
//!
//! - The meter talks a SCPI-like line protocol over its USB serial adapter.
//!   Every exchange is a single `\n` terminated command, optionally followed
//!   by a single response line.
//!
//! - Basic setup and connection
//!
//!   ```no_run
//!   use xdm1041ctrl::{proto::command::Mode, Device, DEFAULT_BAUDRATE};
//!   #[tokio::main]
//!   async fn main() -> xdm1041ctrl::Result<()> {
//!       let mut device = Device::default();
//!       device.connect("/dev/ttyUSB0", DEFAULT_BAUDRATE).await?;
//!       eprintln!("Connected to: {}\n", device.query_identity().await?);
//!       device.configure(Mode::DcVoltage).await?;
//!       println!("{}", device.measure().await?);
//!       Ok(())
//!   }
//!   ```
//!
//! - Continuous measurement is driven by [`poll::Poller`], which hands every
//!   reading to a [`poll::DisplaySink`].
//!
//! # Supported devices
//!
//!  * OWON XDM1041
//!  * OWON XDM1042
//!

pub mod device;
pub mod measurement;
pub mod poll;
pub mod proto;

pub use device::{Device, LinkConfig};
pub use poll::{DisplaySink, PollConfig, Poller};
pub use proto::Result;

#[cfg(unix)]
pub const DEFAULT_TTY: &str = "/dev/ttyUSB0";
#[cfg(windows)]
pub const DEFAULT_TTY: &str = "COM1";

/// Default Baudrate for OWON XDM1041 and XDM1042.
pub const DEFAULT_BAUDRATE: u32 = 115200;
