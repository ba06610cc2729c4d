//! Routing policy: which tasks need ledger confirmation.
//!
//! Classification is a static, total mapping from declared tool identifiers
//! to `Informational` or `Critical`. Search/lookup/estimate operations stay
//! informational; anything that spends money or makes a commitment is
//! critical. Unknown identifiers default to informational with a warning,
//! never silently critical, so a typo cannot trigger an unintended ledger
//! write.

use tracing::warn;

use crate::task::Classification;

/// Tool identifiers with an explicit classification.
///
/// Every reachable tool id maps to exactly one variant; the table below is
/// the single source of truth for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownTool {
    // Informational: lookups and estimates.
    FindRestaurants,
    GetMenu,
    SearchHotels,
    SearchNearbyDrivers,
    EstimateRideFare,
    PlanRoute,
    // Critical: real-world commitments.
    OrderFood,
    ReserveTable,
    BookHotel,
    BookRide,
    ProcessPayment,
}

impl KnownTool {
    /// Parse a declared tool identifier.
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "find_restaurants" => Some(Self::FindRestaurants),
            "get_menu" => Some(Self::GetMenu),
            "search_hotels" => Some(Self::SearchHotels),
            "search_nearby_drivers" => Some(Self::SearchNearbyDrivers),
            "estimate_ride_fare" => Some(Self::EstimateRideFare),
            "plan_route" => Some(Self::PlanRoute),
            "order_food" => Some(Self::OrderFood),
            "reserve_table" => Some(Self::ReserveTable),
            "book_hotel" => Some(Self::BookHotel),
            "book_ride" => Some(Self::BookRide),
            "process_payment" => Some(Self::ProcessPayment),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::FindRestaurants => "find_restaurants",
            Self::GetMenu => "get_menu",
            Self::SearchHotels => "search_hotels",
            Self::SearchNearbyDrivers => "search_nearby_drivers",
            Self::EstimateRideFare => "estimate_ride_fare",
            Self::PlanRoute => "plan_route",
            Self::OrderFood => "order_food",
            Self::ReserveTable => "reserve_table",
            Self::BookHotel => "book_hotel",
            Self::BookRide => "book_ride",
            Self::ProcessPayment => "process_payment",
        }
    }

    /// The classification table. Exhaustive by construction.
    pub fn classification(&self) -> Classification {
        match self {
            Self::FindRestaurants
            | Self::GetMenu
            | Self::SearchHotels
            | Self::SearchNearbyDrivers
            | Self::EstimateRideFare
            | Self::PlanRoute => Classification::Informational,
            Self::OrderFood
            | Self::ReserveTable
            | Self::BookHotel
            | Self::BookRide
            | Self::ProcessPayment => Classification::Critical,
        }
    }
}

const ALL_TOOLS: [KnownTool; 11] = [
    KnownTool::FindRestaurants,
    KnownTool::GetMenu,
    KnownTool::SearchHotels,
    KnownTool::SearchNearbyDrivers,
    KnownTool::EstimateRideFare,
    KnownTool::PlanRoute,
    KnownTool::OrderFood,
    KnownTool::ReserveTable,
    KnownTool::BookHotel,
    KnownTool::BookRide,
    KnownTool::ProcessPayment,
];

/// Pure, side-effect-free task classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingPolicy;

impl RoutingPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Classify a declared tool identifier.
    pub fn classify(&self, tool_id: &str) -> Classification {
        match KnownTool::from_id(tool_id) {
            Some(tool) => tool.classification(),
            None => {
                warn!("unknown tool id {tool_id:?}, defaulting to informational");
                Classification::Informational
            }
        }
    }

    /// Tool ids advertised as critical in the capability card.
    pub fn critical_tools(&self) -> Vec<&'static str> {
        ALL_TOOLS
            .iter()
            .filter(|t| t.classification() == Classification::Critical)
            .map(|t| t.id())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_known_tool_has_a_classification() {
        let policy = RoutingPolicy::new();
        for tool in ALL_TOOLS {
            // Exercise the full path: id -> parse -> classify.
            let classified = policy.classify(tool.id());
            assert_eq!(classified, tool.classification());
        }
    }

    #[test]
    fn test_id_roundtrip() {
        for tool in ALL_TOOLS {
            assert_eq!(KnownTool::from_id(tool.id()), Some(tool));
        }
    }

    #[test]
    fn test_lookups_are_informational() {
        let policy = RoutingPolicy::new();
        for id in [
            "find_restaurants",
            "get_menu",
            "search_hotels",
            "search_nearby_drivers",
            "estimate_ride_fare",
            "plan_route",
        ] {
            assert_eq!(policy.classify(id), Classification::Informational);
        }
    }

    #[test]
    fn test_commitments_are_critical() {
        let policy = RoutingPolicy::new();
        for id in [
            "order_food",
            "reserve_table",
            "book_hotel",
            "book_ride",
            "process_payment",
        ] {
            assert_eq!(policy.classify(id), Classification::Critical);
        }
    }

    #[test]
    fn test_unknown_tool_defaults_to_informational() {
        let policy = RoutingPolicy::new();
        assert_eq!(policy.classify("juggle_flaming_swords"), Classification::Informational);
        assert_eq!(policy.classify(""), Classification::Informational);
    }

    #[test]
    fn test_critical_tools_for_card() {
        let critical = RoutingPolicy::new().critical_tools();
        assert!(critical.contains(&"order_food"));
        assert!(!critical.contains(&"find_restaurants"));
        assert_eq!(critical.len(), 5);
    }
}
