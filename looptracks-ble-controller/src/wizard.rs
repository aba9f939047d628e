//! Setup wizard: Wi-Fi → transit system → line colors, with reset
//!
//! Each step validates its own input and forwards one command to the
//! session. The color step repeats, once per flashing line, and a color
//! already given to a line is not offered again. The wizard never touches
//! session state; it only reads the connectivity status to decide whether
//! the scanning step is done.

use looptracks_proto::{Command, LineColor, TransitSystem};

use crate::session::{SessionHandle, SessionState};
use crate::WizardError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    /// Waiting for a device to connect
    Scanning,
    Wifi,
    TrainSystem,
    Color,
}

/// What the user has completed so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WizardProgress {
    pub wifi_done: bool,
    pub train_system: Option<TransitSystem>,
    /// Colors assigned so far, in the order they were sent
    pub colors: Vec<LineColor>,
}

pub struct Wizard {
    session: SessionHandle,
    progress: WizardProgress,
}

impl Wizard {
    pub fn new(session: SessionHandle) -> Self {
        Self::with_progress(session, WizardProgress::default())
    }

    /// Resume with progress from an earlier run
    pub fn with_progress(session: SessionHandle, progress: WizardProgress) -> Self {
        Self { session, progress }
    }

    pub fn progress(&self) -> &WizardProgress {
        &self.progress
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn step(&self) -> WizardStep {
        if self.session.status().state != SessionState::Connected {
            WizardStep::Scanning
        } else if !self.progress.wifi_done {
            WizardStep::Wifi
        } else if self.progress.train_system.is_none() {
            WizardStep::TrainSystem
        } else {
            WizardStep::Color
        }
    }

    /// Colors still unassigned in the selected transit system, empty until
    /// one is set
    pub fn colors(&self) -> Vec<(LineColor, &'static str)> {
        let Some(system) = self.progress.train_system else {
            return Vec::new();
        };
        system
            .colors()
            .iter()
            .filter(|(color, _)| !self.progress.colors.contains(color))
            .copied()
            .collect()
    }

    pub async fn set_wifi(&mut self, ssid: &str, password: &str) -> Result<(), WizardError> {
        let command = Command::wifi(ssid, password)?;
        log::info!("Sending wifi {ssid}");
        self.session.send_command(command).await?;
        self.progress.wifi_done = true;
        Ok(())
    }

    /// Choosing a different system invalidates the colors assigned under
    /// the old one
    pub async fn set_train_system(&mut self, system: TransitSystem) -> Result<(), WizardError> {
        log::info!("Sending train system {system}");
        self.session.send_command(Command::City(system)).await?;
        if self.progress.train_system != Some(system) {
            self.progress.colors.clear();
        }
        self.progress.train_system = Some(system);
        Ok(())
    }

    pub async fn set_color(&mut self, color: LineColor) -> Result<(), WizardError> {
        log::info!("Sending color {color}");
        self.session.send_command(Command::Color(color)).await?;
        if !self.progress.colors.contains(&color) {
            self.progress.colors.push(color);
        }
        Ok(())
    }

    /// Reset the device's transit setup. Wi-Fi progress is kept since the
    /// device remembers its credentials across a reset.
    pub async fn reset_configuration(&mut self) -> Result<(), WizardError> {
        self.progress.train_system = None;
        self.progress.colors.clear();
        log::info!("Sending reset");
        self.session.reset().await?;
        Ok(())
    }
}
