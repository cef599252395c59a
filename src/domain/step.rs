use std::fmt;

use serde::{Deserialize, Serialize};

/// The visible wizard step. Summary sits between passenger details and
/// payment, so stepping back from it lands on the passenger form.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum WizardStep {
    #[default]
    Journey,
    VehicleSelect,
    PassengerDetails,
    Summary,
    Payment,
}

impl WizardStep {
    /// Step label as shown in the progress indicator.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            WizardStep::Journey => "1",
            WizardStep::VehicleSelect => "2",
            WizardStep::PassengerDetails => "3",
            WizardStep::Summary => "3b",
            WizardStep::Payment => "4",
        }
    }

    #[must_use]
    pub fn is_before(self, other: WizardStep) -> bool {
        self < other
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WizardStep::Journey => "Journey",
            WizardStep::VehicleSelect => "VehicleSelect",
            WizardStep::PassengerDetails => "PassengerDetails",
            WizardStep::Summary => "Summary",
            WizardStep::Payment => "Payment",
        };
        write!(f, "{name}")
    }
}
