use looptracks_proto::ValidationError;

/// Failure to get a command onto the radio
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("not connected to a Loop Tracks device")]
    NotConnected,

    #[error("bluetooth adapter is off, unauthorized or unsupported")]
    AdapterUnavailable,

    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("service discovery failed: {0}")]
    Discovery(String),

    #[error("write rejected: {0}")]
    Write(String),

    #[error("session task has stopped")]
    SessionClosed,

    #[error(transparent)]
    Btle(#[from] btleplug::Error),
}

/// Error returned by the setup wizard entry points
#[derive(thiserror::Error, Debug)]
pub enum WizardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wizard_error_display_passes_through() {
        let err = WizardError::from(ValidationError::EmptyField("SSID"));
        assert_eq!(err.to_string(), "please set the wifi SSID");

        let err = WizardError::from(TransportError::NotConnected);
        assert_eq!(err.to_string(), "not connected to a Loop Tracks device");
    }
}
