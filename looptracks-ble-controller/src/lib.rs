//! Loop Tracks BLE Controller
//!
//! Central-role session and setup wizard for Loop Tracks train-line
//! indicators.
//!
//! # Example
//!
//! ```ignore
//! use looptracks_ble_controller::{btle, SessionConfig, SessionState, Wizard};
//! use looptracks_proto::{LineColor, TransitSystem};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = btle::start(SessionConfig::default()).await?;
//!     session.wait_for(SessionState::Connected).await?;
//!
//!     let mut wizard = Wizard::new(session);
//!     wizard.set_wifi("MySSID", "MyPassword").await?;
//!     wizard.set_train_system(TransitSystem::Cta).await?;
//!     wizard.set_color(LineColor::Pink).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod central;
mod error;
#[cfg(test)]
mod mock;
pub mod session;
pub mod wizard;

pub use central::{AdapterState, Central, CharacteristicInfo, PeripheralHandle, SessionEvent};
pub use error::{TransportError, WizardError};
pub use session::{Session, SessionConfig, SessionHandle, SessionState, SessionStatus};
pub use wizard::{Wizard, WizardProgress, WizardStep};
