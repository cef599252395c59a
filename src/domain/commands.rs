use serde::Deserialize;
use uuid::Uuid;

use crate::domain::draft::JourneyDetails;
use crate::domain::step::WizardStep;
use crate::domain::validation::PassengerForm;

#[derive(Debug, Deserialize)]
#[serde(rename_all_fields = "camelCase")]
pub enum FunnelCommand {
    Start {
        id: Uuid,
    },
    SubmitJourney {
        journey: JourneyDetails,
    },
    LoadQuotes,
    SetCapacityFilter {
        min_passengers: u32,
        min_luggage: u32,
    },
    SelectVehicle {
        vehicle_id: String,
    },
    ContinueToDetails,
    SubmitPassengerDetails {
        form: PassengerForm,
    },
    GoBack {
        to: WizardStep,
    },
    ProceedToPayment,
    ConfirmPayment,
}

impl FunnelCommand {
    /// Commands that talk to the booking record or payment services. At most
    /// one of them runs at a time per funnel.
    #[must_use]
    pub fn is_checkout(&self) -> bool {
        matches!(
            self,
            FunnelCommand::ProceedToPayment | FunnelCommand::ConfirmPayment
        )
    }
}
