use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A vehicle option returned by the fare quote gateway. The price is computed
/// server side and is only ever displayed or forwarded, never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VehicleQuote {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub number_of_passengers: u32,
    #[serde(default)]
    pub number_of_big_luggage: u32,
    #[serde(default)]
    pub pricing: Pricing,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_price: Option<Decimal>,
    /// Remaining breakdown fields, kept opaque.
    #[serde(flatten)]
    pub breakdown: Map<String, Value>,
}

/// Minimum capacity the user asked for in the vehicle step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CapacityFilter {
    pub min_passengers: u32,
    pub min_luggage: u32,
}

impl Default for CapacityFilter {
    fn default() -> Self {
        Self {
            min_passengers: 1,
            min_luggage: 0,
        }
    }
}

impl CapacityFilter {
    #[must_use]
    pub fn new(min_passengers: u32, min_luggage: u32) -> Self {
        Self {
            min_passengers,
            min_luggage,
        }
    }

    #[must_use]
    pub fn admits(&self, vehicle: &VehicleQuote) -> bool {
        vehicle.number_of_passengers >= self.min_passengers
            && vehicle.number_of_big_luggage >= self.min_luggage
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VehicleOption {
    #[serde(flatten)]
    pub vehicle: VehicleQuote,
    pub is_disabled: bool,
}

/// Upper bounds for the capacity filter controls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CapacityBounds {
    pub max_passengers: u32,
    pub max_luggage: u32,
}

/// Annotates every vehicle with whether it satisfies `filter` and moves the
/// disabled ones to the back. Nothing is removed and each group keeps the
/// order the gateway returned.
#[must_use]
pub fn filter_by_capacity(vehicles: &[VehicleQuote], filter: CapacityFilter) -> Vec<VehicleOption> {
    let (mut enabled, disabled): (Vec<_>, Vec<_>) = vehicles
        .iter()
        .map(|vehicle| VehicleOption {
            is_disabled: !filter.admits(vehicle),
            vehicle: vehicle.clone(),
        })
        .partition(|option| !option.is_disabled);

    enabled.extend(disabled);
    enabled
}

/// Largest capacities on offer, falling back to 1 so an empty quote list still
/// yields a usable range.
#[must_use]
pub fn capacity_bounds(vehicles: &[VehicleQuote]) -> CapacityBounds {
    CapacityBounds {
        max_passengers: vehicles
            .iter()
            .map(|v| v.number_of_passengers)
            .max()
            .unwrap_or(1),
        max_luggage: vehicles
            .iter()
            .map(|v| v.number_of_big_luggage)
            .max()
            .unwrap_or(1),
    }
}
