use cellvault_core::Color;

/// Pending-edit configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEditConfig {
    /// Fill painted on a cell while its edit awaits review; `None` leaves fills alone
    pub pending_fill: Option<Color>,
}

impl Default for PendingEditConfig {
    fn default() -> Self {
        Self {
            pending_fill: Some(Color::PENDING),
        }
    }
}
